use std::path::Path;

use vba2py_model::ContainerFormat;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGICS: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// BOF record ids for BIFF8/BIFF5 (`0x0809`), BIFF4, BIFF3 and BIFF2.
const BIFF_BOF_IDS: [u16; 4] = [0x0809, 0x0409, 0x0209, 0x0009];

/// Classifies `bytes` from their signature alone.
pub fn detect_format(bytes: &[u8]) -> ContainerFormat {
    if bytes.starts_with(&OLE_MAGIC) {
        return ContainerFormat::CompoundBinary;
    }
    if ZIP_MAGICS.iter().any(|magic| bytes.starts_with(*magic)) {
        return ContainerFormat::Archive;
    }
    if looks_like_biff_stream(bytes) {
        return ContainerFormat::LegacyRecordStream;
    }
    ContainerFormat::Unknown
}

fn looks_like_biff_stream(bytes: &[u8]) -> bool {
    if bytes.len() < 8 {
        return false;
    }
    let id = u16::from_le_bytes([bytes[0], bytes[1]]);
    let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    BIFF_BOF_IDS.contains(&id) && (4..=20).contains(&len) && bytes.len() >= 4 + len
}

/// Signature-based format plus advice on the file name the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub format: ContainerFormat,
    /// Extension matching the content, when the supplied one does not.
    pub suggested_extension: Option<&'static str>,
    pub extension_mismatch: bool,
}

/// Detects the format of `bytes` and checks it against the extension of `file_name`.
///
/// The extension never influences `format`; it only drives the advisory fields.
pub fn detect_with_name(bytes: &[u8], file_name: &str) -> Detection {
    let format = detect_format(bytes);
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let compatible: &[&str] = match format {
        ContainerFormat::Archive => &["xlsm", "xlsx", "xlsb", "xlam", "xltm", "docm", "pptm", "zip"],
        ContainerFormat::CompoundBinary => &["xls", "xla", "xlt", "bin", "doc", "ppt"],
        ContainerFormat::LegacyRecordStream => &["xls", "xla", "xlt"],
        ContainerFormat::Unknown => &[],
    };
    // No extension (stdin, bare names) leaves nothing to compare against.
    let extension_mismatch =
        format != ContainerFormat::Unknown && !ext.is_empty() && !compatible.contains(&ext.as_str());
    let suggested_extension = extension_mismatch.then(|| match format {
        ContainerFormat::Archive => "xlsm",
        _ => "xls",
    });

    Detection {
        format,
        suggested_extension,
        extension_mismatch,
    }
}

/// Raw input bytes together with their detected format. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceContainer {
    bytes: Vec<u8>,
    format: ContainerFormat,
}

impl SourceContainer {
    pub fn new(bytes: Vec<u8>) -> Self {
        let format = detect_format(&bytes);
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }
}
