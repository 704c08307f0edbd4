use encoding_rs::{
    Encoding, BIG5, EUC_KR, GBK, KOI8_R, MACINTOSH, SHIFT_JIS, UTF_16LE, UTF_8, WINDOWS_1250,
    WINDOWS_1251, WINDOWS_1252, WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256,
    WINDOWS_1257, WINDOWS_1258, WINDOWS_874,
};
use thiserror::Error;

/// Module type recorded in the `dir` stream (MS-OVBA 2.3.4.2.3.2.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirModuleType {
    /// `0x0021`: standard (procedural) module.
    Procedural,
    /// `0x0022`: document, class or designer module.
    NonProcedural,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub stream_name: String,
    pub module_type: DirModuleType,
    pub text_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirStream {
    pub codepage: Option<u16>,
    pub project_name: Option<String>,
    pub modules: Vec<ModuleRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirError {
    #[error("dir stream is truncated")]
    Truncated,
    #[error("dir record claims a length beyond the remaining bytes (id={id:#06x}, len={len})")]
    BadRecordLength { id: u16, len: usize },
}

const PROJECTCODEPAGE: u16 = 0x0003;
const PROJECTNAME: u16 = 0x0004;
const PROJECTVERSION: u16 = 0x0009;
const PROJECTTERMINATOR: u16 = 0x0010;
const MODULENAME: u16 = 0x0019;
const MODULESTREAMNAME: u16 = 0x001A;
const MODULETYPE_PROCEDURAL: u16 = 0x0021;
const MODULETYPE_NONPROCEDURAL: u16 = 0x0022;
const MODULETERMINATOR: u16 = 0x002B;
const MODULEOFFSET: u16 = 0x0031;
const MODULESTREAMNAME_UNICODE: u16 = 0x0032;
const MODULENAME_UNICODE: u16 = 0x0047;

impl DirStream {
    /// Parse a decompressed `VBA/dir` stream.
    ///
    /// Only the records needed to locate and decode module source are interpreted; everything
    /// else is skipped by its length.
    pub fn parse(decompressed: &[u8]) -> Result<Self, DirError> {
        let mut offset = 0usize;
        let mut codepage = None;
        let mut project_name_bytes: Option<&[u8]> = None;
        let mut modules: Vec<ModuleRecord> = Vec::new();
        let mut current: Option<PendingModule> = None;

        while offset < decompressed.len() {
            if offset + 6 > decompressed.len() {
                return Err(DirError::Truncated);
            }
            let id = u16::from_le_bytes([decompressed[offset], decompressed[offset + 1]]);
            let mut len = u32::from_le_bytes([
                decompressed[offset + 2],
                decompressed[offset + 3],
                decompressed[offset + 4],
                decompressed[offset + 5],
            ]) as usize;
            offset += 6;
            // PROJECTVERSION declares a 4-byte size but carries 6 bytes of payload.
            if id == PROJECTVERSION {
                len = 6;
            }
            if offset + len > decompressed.len() {
                return Err(DirError::BadRecordLength { id, len });
            }
            let data = &decompressed[offset..offset + len];
            offset += len;

            match id {
                PROJECTCODEPAGE if data.len() >= 2 => {
                    codepage = Some(u16::from_le_bytes([data[0], data[1]]));
                }
                PROJECTNAME => project_name_bytes = Some(data),
                MODULENAME => {
                    if let Some(m) = current.take() {
                        modules.push(m.finish(codepage));
                    }
                    current = Some(PendingModule::new(data));
                }
                MODULENAME_UNICODE => {
                    if let Some(m) = current.as_mut() {
                        m.name_unicode = Some(data);
                    }
                }
                MODULESTREAMNAME => {
                    if let Some(m) = current.as_mut() {
                        m.stream_name = Some(data);
                    }
                }
                MODULESTREAMNAME_UNICODE => {
                    if let Some(m) = current.as_mut() {
                        m.stream_name_unicode = Some(data);
                    }
                }
                MODULEOFFSET if data.len() >= 4 => {
                    if let Some(m) = current.as_mut() {
                        m.text_offset =
                            Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize);
                    }
                }
                MODULETYPE_PROCEDURAL | MODULETYPE_NONPROCEDURAL => {
                    if let Some(m) = current.as_mut() {
                        m.module_type = if id == MODULETYPE_PROCEDURAL {
                            DirModuleType::Procedural
                        } else {
                            DirModuleType::NonProcedural
                        };
                    }
                }
                MODULETERMINATOR => {
                    if let Some(m) = current.take() {
                        modules.push(m.finish(codepage));
                    }
                }
                PROJECTTERMINATOR => break,
                _ => {}
            }
        }

        if let Some(m) = current.take() {
            modules.push(m.finish(codepage));
        }

        Ok(Self {
            codepage,
            project_name: project_name_bytes.map(|b| decode_bytes(b, encoding_for(codepage))),
            modules,
        })
    }

    pub fn encoding(&self) -> &'static Encoding {
        encoding_for(self.codepage)
    }
}

struct PendingModule<'a> {
    name: &'a [u8],
    name_unicode: Option<&'a [u8]>,
    stream_name: Option<&'a [u8]>,
    stream_name_unicode: Option<&'a [u8]>,
    module_type: DirModuleType,
    text_offset: Option<usize>,
}

impl<'a> PendingModule<'a> {
    fn new(name: &'a [u8]) -> Self {
        Self {
            name,
            name_unicode: None,
            stream_name: None,
            stream_name_unicode: None,
            module_type: DirModuleType::Unspecified,
            text_offset: None,
        }
    }

    fn finish(self, codepage: Option<u16>) -> ModuleRecord {
        let encoding = encoding_for(codepage);
        let name = match self.name_unicode {
            Some(u) if !u.is_empty() => decode_bytes(u, UTF_16LE),
            _ => decode_bytes(self.name, encoding),
        };
        let stream_name = match (self.stream_name_unicode, self.stream_name) {
            (Some(u), _) if !u.is_empty() => decode_bytes(u, UTF_16LE),
            (_, Some(s)) if !s.is_empty() => decode_bytes(s, encoding),
            _ => name.clone(),
        };
        ModuleRecord {
            name,
            stream_name,
            module_type: self.module_type,
            text_offset: self.text_offset,
        }
    }
}

/// Maps a Windows codepage number to an `encoding_rs` encoding, defaulting to Windows-1252.
pub fn encoding_for(codepage: Option<u16>) -> &'static Encoding {
    match codepage {
        Some(874) => WINDOWS_874,
        Some(932) => SHIFT_JIS,
        Some(936) => GBK,
        Some(949) => EUC_KR,
        Some(950) => BIG5,
        Some(1200) => UTF_16LE,
        Some(1250) => WINDOWS_1250,
        Some(1251) => WINDOWS_1251,
        Some(1253) => WINDOWS_1253,
        Some(1254) => WINDOWS_1254,
        Some(1255) => WINDOWS_1255,
        Some(1256) => WINDOWS_1256,
        Some(1257) => WINDOWS_1257,
        Some(1258) => WINDOWS_1258,
        Some(10000) => MACINTOSH,
        Some(20866) => KOI8_R,
        Some(65001) => UTF_8,
        _ => WINDOWS_1252,
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (cow, _) = encoding.decode_without_bom_handling(bytes);
    cow.trim_end_matches('\0').to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn parses_modules_with_unicode_names_and_version_quirk() {
        let mut dir = Vec::new();
        push_record(&mut dir, PROJECTCODEPAGE, &1251u16.to_le_bytes());
        push_record(&mut dir, PROJECTNAME, b"VBAProject");
        // PROJECTVERSION: size says 4, payload is 6.
        dir.extend_from_slice(&PROJECTVERSION.to_le_bytes());
        dir.extend_from_slice(&4u32.to_le_bytes());
        dir.extend_from_slice(&[1, 0, 0, 0, 2, 0]);

        push_record(&mut dir, MODULENAME, b"Module1");
        push_record(&mut dir, MODULESTREAMNAME, b"Module1");
        push_record(&mut dir, MODULESTREAMNAME_UNICODE, &utf16("Module1"));
        push_record(&mut dir, MODULETYPE_PROCEDURAL, &[]);
        push_record(&mut dir, MODULEOFFSET, &42u32.to_le_bytes());
        push_record(&mut dir, MODULETERMINATOR, &[]);

        push_record(&mut dir, MODULENAME, &[0xCB, 0xE8, 0xF1, 0xF2]);
        push_record(&mut dir, MODULETYPE_NONPROCEDURAL, &[]);
        push_record(&mut dir, MODULETERMINATOR, &[]);
        push_record(&mut dir, PROJECTTERMINATOR, &[]);

        let parsed = DirStream::parse(&dir).unwrap();
        assert_eq!(parsed.project_name.as_deref(), Some("VBAProject"));
        assert_eq!(parsed.codepage, Some(1251));
        assert_eq!(
            parsed.modules,
            vec![
                ModuleRecord {
                    name: "Module1".into(),
                    stream_name: "Module1".into(),
                    module_type: DirModuleType::Procedural,
                    text_offset: Some(42),
                },
                ModuleRecord {
                    name: "Лист".into(),
                    stream_name: "Лист".into(),
                    module_type: DirModuleType::NonProcedural,
                    text_offset: None,
                },
            ]
        );
    }

    #[test]
    fn rejects_records_running_past_the_end() {
        let mut dir = Vec::new();
        dir.extend_from_slice(&MODULENAME.to_le_bytes());
        dir.extend_from_slice(&100u32.to_le_bytes());
        dir.extend_from_slice(b"short");
        assert_eq!(
            DirStream::parse(&dir),
            Err(DirError::BadRecordLength { id: MODULENAME, len: 100 })
        );
        assert_eq!(DirStream::parse(&[0x19, 0x00]), Err(DirError::Truncated));
    }
}
