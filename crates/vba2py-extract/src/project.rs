use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use cfb::CompoundFile;
use encoding_rs::Encoding;
use vba2py_model::{ModuleOrigin, RawModule};

use crate::compression::{decompress_container, decompress_container_with_limit, output_limit, CHUNK_SIZE};
use crate::dir::{decode_bytes, DirModuleType, DirStream, ModuleRecord};
use crate::{ExtractError, ExtractOptions, ModuleError, ModuleFailure, Recovered};

/// Storage paths of every VBA project in the compound file: storages holding a `VBA/dir` stream.
pub(crate) fn find_projects<F: Read + Seek>(ole: &CompoundFile<F>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = ole
        .walk()
        .filter(|entry| entry.is_stream() && entry.name().eq_ignore_ascii_case("dir"))
        .filter_map(|entry| {
            let vba = entry.path().parent()?;
            let is_vba = vba
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case("VBA"));
            if is_vba {
                vba.parent().map(Path::to_path_buf)
            } else {
                None
            }
        })
        .collect();
    roots.sort();
    roots.dedup();
    roots
}

pub(crate) fn open_compound(bytes: &[u8]) -> Result<CompoundFile<Cursor<&[u8]>>, ExtractError> {
    CompoundFile::open(Cursor::new(bytes)).map_err(|e| ExtractError::ContainerFormat {
        reason: format!("compound file header or directory is unreadable: {e}"),
    })
}

/// Reads every module of every VBA project found in a compound file.
///
/// Returns `None` when the file holds no project at all.
pub(crate) fn read_projects<F: Read + Seek>(
    ole: &mut CompoundFile<F>,
    origin: ModuleOrigin,
    options: &ExtractOptions,
) -> Option<Recovered> {
    let roots = find_projects(ole);
    if roots.is_empty() {
        return None;
    }
    let mut recovered = Recovered::default();
    for root in roots {
        log::debug!("reading VBA project at {}", root.display());
        read_project(ole, &root, origin, options, &mut recovered);
    }
    Some(recovered)
}

fn read_project<F: Read + Seek>(
    ole: &mut CompoundFile<F>,
    root: &Path,
    origin: ModuleOrigin,
    options: &ExtractOptions,
    out: &mut Recovered,
) {
    let vba = root.join("VBA");
    let dir = match read_dir_stream(ole, &vba, options) {
        Ok(dir) => dir,
        Err(err) => {
            let failure = ModuleFailure::from_error(format!("VBA project at {}", root.display()), origin, &err);
            log::warn!("{}: {}", failure.name, failure.message);
            out.failures.push(failure);
            return;
        }
    };

    let encoding = dir.encoding();
    let declared = read_stream(ole, &root.join("PROJECT"), options.max_input_bytes)
        .map(|bytes| parse_project_stream(&bytes, encoding))
        .unwrap_or_default();

    for record in &dir.modules {
        match read_module(ole, &vba, record, encoding, options) {
            Ok(text) => {
                let hint = declared
                    .get(&record.name.to_ascii_lowercase())
                    .copied()
                    .or(match record.module_type {
                        DirModuleType::Procedural => Some("standard"),
                        DirModuleType::NonProcedural => Some("nonprocedural"),
                        DirModuleType::Unspecified => None,
                    });
                out.modules.push(build_raw_module(&record.name, &text, origin, hint));
            }
            Err(err) => {
                let failure = ModuleFailure::from_error(record.name.clone(), origin, &err);
                log::warn!("module {}: {}", failure.name, failure.message);
                out.failures.push(failure);
            }
        }
    }
}

fn read_dir_stream<F: Read + Seek>(
    ole: &mut CompoundFile<F>,
    vba: &Path,
    options: &ExtractOptions,
) -> Result<DirStream, ModuleError> {
    let compressed = read_stream(ole, &vba.join("dir"), options.max_input_bytes)?;
    let limit = output_limit(compressed.len(), options.max_expansion_ratio);
    let bytes = decompress_container_with_limit(&compressed, limit)?;
    Ok(DirStream::parse(&bytes)?)
}

fn read_stream<F: Read + Seek>(
    ole: &mut CompoundFile<F>,
    path: &Path,
    cap: usize,
) -> Result<Vec<u8>, ModuleError> {
    let stream_name = path.display().to_string();
    if !ole.is_stream(path) {
        return Err(ModuleError::MissingStream(stream_name));
    }
    let io_err = |source| ModuleError::Io {
        stream: path.display().to_string(),
        source,
    };
    let stream = ole.open_stream(path).map_err(io_err)?;
    let mut bytes = Vec::new();
    stream.take(cap as u64).read_to_end(&mut bytes).map_err(io_err)?;
    Ok(bytes)
}

fn read_module<F: Read + Seek>(
    ole: &mut CompoundFile<F>,
    vba: &Path,
    record: &ModuleRecord,
    encoding: &'static Encoding,
    options: &ExtractOptions,
) -> Result<String, ModuleError> {
    let stream = read_stream(ole, &vba.join(&record.stream_name), options.max_input_bytes)?;
    let offset = record.text_offset.unwrap_or_else(|| guess_text_offset(&stream));
    let compressed = stream.get(offset..).ok_or(ModuleError::BadTextOffset {
        offset,
        len: stream.len(),
    })?;
    let limit = output_limit(compressed.len(), options.max_expansion_ratio);
    let source = decompress_container_with_limit(compressed, limit)?;
    Ok(decode_bytes(&source, encoding))
}

/// Builds a [`RawModule`] from decompressed source: line endings are normalized, the
/// `Attribute VB_Name` line is removed and becomes the name, remaining attributes are parsed.
pub(crate) fn build_raw_module(
    fallback_name: &str,
    text: &str,
    origin: ModuleOrigin,
    hint: Option<&str>,
) -> RawModule {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let (vb_name, source) = strip_vb_name(&normalized);
    let name = vb_name.filter(|n| !n.is_empty()).unwrap_or_else(|| fallback_name.to_string());
    let mut module = RawModule::new(name, source, origin);
    module.attributes = parse_attributes(&module.source_text);
    module.declared_type_hint = hint.map(str::to_string);
    module
}

/// Removes the first `Attribute VB_Name = "..."` line and returns its value.
pub(crate) fn strip_vb_name(text: &str) -> (Option<String>, String) {
    let mut name = None;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if name.is_none() {
            if let Some(value) = attribute_value(line, "VB_Name") {
                name = Some(value);
                continue;
            }
        }
        out.push_str(line);
    }
    (name, out)
}

fn attribute_value(line: &str, key: &str) -> Option<String> {
    let rest = strip_prefix_ignore_case(line.trim(), "Attribute ")?;
    let (k, v) = rest.split_once('=')?;
    if !k.trim().eq_ignore_ascii_case(key) {
        return None;
    }
    Some(unquote(v.trim()).to_string())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

pub(crate) fn parse_attributes(code: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for line in code.lines() {
        let Some(rest) = strip_prefix_ignore_case(line.trim(), "Attribute ") else {
            continue;
        };
        let Some((key, value)) = rest.split_once('=') else {
            continue;
        };
        attrs.insert(key.trim().to_owned(), unquote(value.trim()).to_owned());
    }
    attrs
}

/// `Module=`, `Class=`, `Document=` and `BaseClass=` lines of the `PROJECT` stream, keyed by
/// lower-cased module name.
fn parse_project_stream(bytes: &[u8], encoding: &'static Encoding) -> BTreeMap<String, &'static str> {
    let text = decode_bytes(bytes, encoding);
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            break;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let hint = match key.trim().to_ascii_lowercase().as_str() {
            "module" => "standard",
            "class" => "class",
            "document" => "document",
            "baseclass" => "form",
            _ => continue,
        };
        let name = value.split('/').next().unwrap_or(value).trim();
        out.insert(name.to_ascii_lowercase(), hint);
    }
    out
}

/// Signature-matching positions tried before giving up on a stream without a text offset.
const MAX_OFFSET_CANDIDATES: usize = 1024;

/// Best-effort start of the compressed source when the `dir` stream has no text offset: the first
/// `0x01` byte followed by a chunk that decompresses on its own and is either full or the last
/// bytes of the stream. Only that first chunk is decoded per candidate; the caller decompresses
/// the whole container once.
fn guess_text_offset(module_stream: &[u8]) -> usize {
    let header_at = |idx: usize| u16::from_le_bytes([module_stream[idx + 1], module_stream[idx + 2]]);
    let candidates = (0..module_stream.len().saturating_sub(3))
        .filter(|&idx| module_stream[idx] == 0x01 && (header_at(idx) & 0x7000) >> 12 == 0b011)
        .take(MAX_OFFSET_CANDIDATES);
    for idx in candidates {
        // Signature byte, two header bytes and `size + 1` data bytes.
        let end = idx + usize::from(header_at(idx) & 0x0FFF) + 4;
        let Some(first_chunk) = module_stream.get(idx..end) else {
            continue;
        };
        let plausible = decompress_container(first_chunk)
            .is_ok_and(|text| !text.is_empty() && (text.len() == CHUNK_SIZE || end == module_stream.len()));
        if plausible {
            return idx;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_only_the_vb_name_attribute() {
        let module = build_raw_module(
            "Fallback",
            "Attribute VB_Name = \"Calc\"\r\nAttribute VB_Exposed = False\r\nSub A()\r\nEnd Sub\r\n",
            ModuleOrigin::CompoundProject,
            Some("standard"),
        );
        assert_eq!(module.name, "Calc");
        assert_eq!(module.source_text, "Attribute VB_Exposed = False\nSub A()\nEnd Sub\n");
        assert_eq!(module.attribute("vb_exposed"), Some("False"));
        assert_eq!(module.declared_type_hint.as_deref(), Some("standard"));
    }

    #[test]
    fn falls_back_to_directory_name() {
        let module = build_raw_module("Module7", "Sub A()\nEnd Sub", ModuleOrigin::ArchiveProject, None);
        assert_eq!(module.name, "Module7");
    }

    #[test]
    fn project_stream_declares_module_types() {
        let stream = b"ID=\"{0}\"\r\nDocument=ThisWorkbook/&H00000000\r\nModule=Module1\r\nClass=Policy\r\nBaseClass=UserForm1\r\n\r\n[Host Extender Info]\r\nModule=Ignored\r\n";
        let parsed = parse_project_stream(stream, encoding_rs::WINDOWS_1252);
        assert_eq!(parsed.get("thisworkbook"), Some(&"document"));
        assert_eq!(parsed.get("module1"), Some(&"standard"));
        assert_eq!(parsed.get("policy"), Some(&"class"));
        assert_eq!(parsed.get("userform1"), Some(&"form"));
        assert_eq!(parsed.get("ignored"), None);
    }

    #[test]
    fn guesses_offset_after_a_performance_cache() {
        let mut stream = vec![0xAA, 0x01, 0x00, 0x00, 0x55];
        let start = stream.len();
        stream.extend(crate::compression::compress_container(b"Sub A()\r\nEnd Sub\r\n"));
        assert_eq!(guess_text_offset(&stream), start);
    }

    #[test]
    fn guessed_offset_checks_only_the_first_chunk() {
        let source = "Sub A()\r\n    x = 1\r\nEnd Sub\r\n".repeat(400);
        let mut stream = vec![0x01, 0x00, 0xB0, 0x01, 0x10, 0x30, 0x7F];
        let start = stream.len();
        stream.extend(crate::compression::compress_container(source.as_bytes()));
        assert_eq!(guess_text_offset(&stream), start);
    }

    #[test]
    fn hostile_stream_without_a_container_falls_back_to_zero() {
        let stream: Vec<u8> = [0x01, 0xFF, 0xBF].repeat(100_000);
        assert_eq!(guess_text_offset(&stream), 0);
    }
}
