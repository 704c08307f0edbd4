#![allow(dead_code)]

use std::io::{Cursor, Write};

use vba2py_extract::compress_container;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// dir stream record ids.
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

// BIFF8 record ids.
const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_SST: u16 = 0x00FC;
const RECORD_LABELSST: u16 = 0x00FD;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_DT_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;

/// Bytes written before the compressed source, standing in for the performance cache.
const PERFORMANCE_CACHE: &[u8] = &[0xAA, 0xBB, 0x01, 0x00, 0xCC, 0xDD];

/// One module of a fixture project. `project_line` is its `PROJECT` stream declaration
/// (`Module=`, `Class=`, `Document=...`).
pub struct FixtureModule {
    pub name: &'static str,
    pub procedural: bool,
    pub project_line: Option<String>,
    pub source: String,
    /// Replaces the compressed source with these bytes.
    pub corrupt: Option<Vec<u8>>,
}

impl FixtureModule {
    pub fn standard(name: &'static str, body: &str) -> Self {
        Self {
            name,
            procedural: true,
            project_line: Some(format!("Module={name}")),
            source: with_vb_name(name, body),
            corrupt: None,
        }
    }

    pub fn class(name: &'static str, body: &str) -> Self {
        Self {
            name,
            procedural: false,
            project_line: Some(format!("Class={name}")),
            source: with_vb_name(name, body),
            corrupt: None,
        }
    }

    pub fn document(name: &'static str, body: &str) -> Self {
        Self {
            name,
            procedural: false,
            project_line: Some(format!("Document={name}/&H00000000")),
            source: with_vb_name(name, body),
            corrupt: None,
        }
    }

    pub fn corrupted(mut self, bytes: Vec<u8>) -> Self {
        self.corrupt = Some(bytes);
        self
    }
}

fn with_vb_name(name: &str, body: &str) -> String {
    format!("Attribute VB_Name = \"{name}\"\r\n{}", body.replace('\n', "\r\n"))
}

fn push_dir_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn dir_stream(modules: &[FixtureModule]) -> Vec<u8> {
    let mut dir = Vec::new();
    push_dir_record(&mut dir, PROJECTCODEPAGE, &1252u16.to_le_bytes());
    push_dir_record(&mut dir, PROJECTNAME, b"VBAProject");
    dir.extend_from_slice(&PROJECTVERSION.to_le_bytes());
    dir.extend_from_slice(&4u32.to_le_bytes());
    dir.extend_from_slice(&[0x5E, 0x00, 0x00, 0x00, 0x03, 0x00]);
    for module in modules {
        push_dir_record(&mut dir, MODULENAME, module.name.as_bytes());
        push_dir_record(&mut dir, MODULESTREAMNAME, module.name.as_bytes());
        push_dir_record(&mut dir, MODULEOFFSET, &(PERFORMANCE_CACHE.len() as u32).to_le_bytes());
        let kind = if module.procedural {
            MODULETYPE_PROCEDURAL
        } else {
            MODULETYPE_NONPROCEDURAL
        };
        push_dir_record(&mut dir, kind, &[]);
        push_dir_record(&mut dir, MODULETERMINATOR, &[]);
    }
    push_dir_record(&mut dir, PROJECTTERMINATOR, &[]);
    compress_container(&dir)
}

fn write_stream<F: std::io::Read + std::io::Write + std::io::Seek>(
    ole: &mut cfb::CompoundFile<F>,
    path: &str,
    bytes: &[u8],
) {
    let mut stream = ole.create_stream(path).expect("create stream");
    stream.write_all(bytes).expect("write stream");
}

/// Builds a compound file holding one VBA project under `root` (`""` for a bare
/// `vbaProject.bin`, `"_VBA_PROJECT_CUR"` for a legacy workbook).
pub fn build_vba_project(root: &str, modules: &[FixtureModule]) -> Vec<u8> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
    let base = if root.is_empty() {
        String::new()
    } else {
        ole.create_storage(format!("/{root}")).expect("project storage");
        format!("/{root}")
    };
    ole.create_storage(format!("{base}/VBA")).expect("VBA storage");

    write_stream(&mut ole, &format!("{base}/VBA/dir"), &dir_stream(modules));

    let mut project = String::from("ID=\"{00000000-0000-0000-0000-000000000000}\"\r\n");
    for module in modules {
        let mut stream = PERFORMANCE_CACHE.to_vec();
        match &module.corrupt {
            Some(bytes) => stream.extend_from_slice(bytes),
            None => stream.extend(compress_container(module.source.as_bytes())),
        }
        write_stream(&mut ole, &format!("{base}/VBA/{}", module.name), &stream);
        if let Some(line) = &module.project_line {
            project.push_str(line);
            project.push_str("\r\n");
        }
    }
    project.push_str("Name=\"VBAProject\"\r\n\r\n[Host Extender Info]\r\n");
    write_stream(&mut ole, &format!("{base}/PROJECT"), project.as_bytes());

    ole.flush().expect("flush cfb");
    ole.into_inner().into_inner()
}

pub fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(dt: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&BOF_VERSION_BIFF8.to_le_bytes());
    out.extend_from_slice(&dt.to_le_bytes());
    out.extend_from_slice(&[0u8; 12]);
    out
}

/// BIFF8 workbook stream whose sheets hold string cells, one per row in column A.
pub fn build_biff8_workbook_stream(sheets: &[(&str, Vec<&str>)]) -> Vec<u8> {
    let strings: Vec<&str> = sheets.iter().flat_map(|(_, cells)| cells.iter().copied()).collect();

    let mut globals = Vec::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    push_record(&mut globals, RECORD_CODEPAGE, &1200u16.to_le_bytes());
    let mut boundsheet_offsets = Vec::new();
    for (name, _) in sheets {
        boundsheet_offsets.push(globals.len() + 4);
        let mut data = vec![0, 0, 0, 0, 0, 0, name.len() as u8, 0];
        data.extend_from_slice(name.as_bytes());
        push_record(&mut globals, RECORD_BOUNDSHEET, &data);
    }
    let mut sst = Vec::new();
    sst.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    sst.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in &strings {
        sst.extend_from_slice(&(s.len() as u16).to_le_bytes());
        sst.push(0);
        sst.extend_from_slice(s.as_bytes());
    }
    push_record(&mut globals, RECORD_SST, &sst);
    push_record(&mut globals, RECORD_EOF, &[]);

    let mut stream = globals;
    let mut isst = 0u32;
    for (idx, (_, cells)) in sheets.iter().enumerate() {
        let offset = stream.len() as u32;
        let at = boundsheet_offsets[idx];
        stream[at..at + 4].copy_from_slice(&offset.to_le_bytes());

        push_record(&mut stream, RECORD_BOF, &bof(BOF_DT_WORKSHEET));
        for (row, _) in cells.iter().enumerate() {
            let mut data = Vec::new();
            data.extend_from_slice(&(row as u16).to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&isst.to_le_bytes());
            push_record(&mut stream, RECORD_LABELSST, &data);
            isst += 1;
        }
        push_record(&mut stream, RECORD_EOF, &[]);
    }
    stream
}

/// `.xls` compound file with a `Workbook` stream and no VBA project.
pub fn build_xls(sheets: &[(&str, Vec<&str>)]) -> Vec<u8> {
    let workbook_stream = build_biff8_workbook_stream(sheets);
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
    write_stream(&mut ole, "Workbook", &workbook_stream);
    ole.flush().expect("flush cfb");
    ole.into_inner().into_inner()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A cell of an archive fixture sheet.
pub enum XlsxCell<'a> {
    Text(&'a str),
    /// Formula text without the leading `=`.
    Formula(&'a str),
}

fn sheet_xml(cells: &[XlsxCell<'_>]) -> String {
    let mut rows = String::new();
    for (idx, cell) in cells.iter().enumerate() {
        let r = idx + 1;
        let c = match cell {
            XlsxCell::Text(text) => format!(
                r#"<c r="A{r}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                xml_escape(text)
            ),
            XlsxCell::Formula(f) => format!(r#"<c r="A{r}"><f>{}</f><v>0</v></c>"#, xml_escape(f)),
        };
        rows.push_str(&format!(r#"<row r="{r}">{c}</row>"#));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
    )
}

/// Minimal `.xlsx`/`.xlsm` package. `vba_project` adds `xl/vbaProject.bin`.
pub fn build_xlsx(sheets: &[(&str, Vec<XlsxCell<'_>>)], vba_project: Option<&[u8]>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let mut overrides = String::new();
    let mut workbook_sheets = String::new();
    let mut rels = String::new();
    for (idx, (name, _)) in sheets.iter().enumerate() {
        let n = idx + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook_sheets.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            xml_escape(name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }

    let files: Vec<(String, String)> = vec![
        (
            "[Content_Types].xml".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.ms-excel.sheet.macroEnabled.main+xml"/>{overrides}</Types>"#
            ),
        ),
        (
            "_rels/.rels".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{workbook_sheets}</sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            ),
        ),
    ];
    for (name, body) in files {
        zip.start_file(name, options).expect("start file");
        zip.write_all(body.as_bytes()).expect("write file");
    }
    for (idx, (_, cells)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", idx + 1), options)
            .expect("start sheet");
        zip.write_all(sheet_xml(cells).as_bytes()).expect("write sheet");
    }
    if let Some(project) = vba_project {
        zip.start_file("xl/vbaProject.bin", options).expect("start project");
        zip.write_all(project).expect("write project");
    }
    zip.finish().expect("finish zip").into_inner()
}
