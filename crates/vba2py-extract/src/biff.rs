//! Minimal BIFF5/BIFF8 workbook-stream reader.
//!
//! Only string cells are recovered: macro text pasted into a sheet is always stored as `LABELSST`
//! (BIFF8, via the shared string table) or `LABEL` (BIFF5 and some BIFF8 writers). Numbers,
//! formulas and formatting are skipped without interpretation.

use encoding_rs::{Encoding, UTF_16LE};

use crate::dir::{decode_bytes, encoding_for};

const RECORD_BOF_BIFF8: u16 = 0x0809;
const RECORD_BOF_BIFF5: u16 = 0x0009;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CONTINUE: u16 = 0x003C;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_SST: u16 = 0x00FC;
const RECORD_LABELSST: u16 = 0x00FD;
const RECORD_LABEL: u16 = 0x0204;

const BIFF8_VERSION: u16 = 0x0600;

// XLUnicodeRichExtendedString option flags.
const STR_FLAG_HIGH_BYTE: u8 = 0x01;
const STR_FLAG_EXT: u8 = 0x04;
const STR_FLAG_RICH_TEXT: u8 = 0x08;

/// Upper bound on SST entries reserved up front; corrupt counts must not drive allocation.
const MAX_SST_PREALLOC: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiffCell {
    pub row: u32,
    pub col: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiffSheet {
    pub name: String,
    pub cells: Vec<BiffCell>,
}

#[derive(Debug, Clone, Copy)]
struct BiffRecord<'a> {
    offset: usize,
    record_id: u16,
    data: &'a [u8],
}

/// Iterator over physical records. A truncated header or payload ends iteration with an `Err`.
struct BiffRecordIter<'a> {
    stream: &'a [u8],
    offset: usize,
}

impl<'a> BiffRecordIter<'a> {
    fn from_offset(stream: &'a [u8], offset: usize) -> Self {
        Self { stream, offset }
    }
}

impl<'a> Iterator for BiffRecordIter<'a> {
    type Item = Result<BiffRecord<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.stream.len() {
            return None;
        }
        let offset = self.offset;
        let Some(header) = self.stream.get(offset..offset + 4) else {
            self.offset = self.stream.len();
            return Some(Err("truncated BIFF record header".to_string()));
        };
        let record_id = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let data_end = offset + 4 + len;
        let Some(data) = self.stream.get(offset + 4..data_end) else {
            self.offset = self.stream.len();
            return Some(Err(format!(
                "BIFF record 0x{record_id:04X} at offset {offset} extends past end of stream (len={})",
                self.stream.len()
            )));
        };
        self.offset = data_end;
        Some(Ok(BiffRecord {
            offset,
            record_id,
            data,
        }))
    }
}

fn is_bof(record_id: u16) -> bool {
    record_id == RECORD_BOF_BIFF8 || record_id == RECORD_BOF_BIFF5
}

struct BoundSheet {
    name: String,
    substream_offset: usize,
}

struct Globals {
    biff8: bool,
    encoding: &'static Encoding,
    sheets: Vec<BoundSheet>,
    sst: Vec<String>,
    /// Offset just past the globals `EOF`.
    end: usize,
}

/// Reads the string cells of every sheet in a BIFF5/BIFF8 workbook stream.
///
/// Sheets come back in `BOUNDSHEET` order. A sheet whose substream cannot be located yields an
/// empty cell list; a truncated record inside a sheet keeps the cells read so far.
pub fn read_sheet_strings(workbook_stream: &[u8]) -> Result<Vec<BiffSheet>, String> {
    let globals = read_globals(workbook_stream)?;
    log::debug!(
        "BIFF{} workbook: {} sheet(s), {} shared string(s)",
        if globals.biff8 { 8 } else { 5 },
        globals.sheets.len(),
        globals.sst.len()
    );

    let sequential = substream_starts(workbook_stream, globals.end);
    let mut out = Vec::with_capacity(globals.sheets.len());
    for (idx, sheet) in globals.sheets.iter().enumerate() {
        let start = if points_at_bof(workbook_stream, sheet.substream_offset) {
            Some(sheet.substream_offset)
        } else {
            sequential.get(idx).copied()
        };
        let cells = match start {
            Some(start) => read_sheet_cells(workbook_stream, start, &globals),
            None => {
                log::warn!("sheet `{}` has no locatable substream", sheet.name);
                Vec::new()
            }
        };
        out.push(BiffSheet {
            name: sheet.name.clone(),
            cells,
        });
    }
    Ok(out)
}

fn read_globals(stream: &[u8]) -> Result<Globals, String> {
    let mut iter = BiffRecordIter::from_offset(stream, 0).peekable();
    let bof = match iter.next() {
        Some(Ok(record)) if is_bof(record.record_id) => record,
        Some(Err(err)) => return Err(err),
        _ => return Err("workbook stream does not start with a BOF record".to_string()),
    };
    let biff8 = bof.record_id == RECORD_BOF_BIFF8
        && bof.data.len() >= 2
        && u16::from_le_bytes([bof.data[0], bof.data[1]]) >= BIFF8_VERSION;

    let mut globals = Globals {
        biff8,
        encoding: encoding_for(None),
        sheets: Vec::new(),
        sst: Vec::new(),
        end: stream.len(),
    };

    while let Some(record) = iter.next() {
        let record = record?;
        match record.record_id {
            RECORD_CODEPAGE if record.data.len() >= 2 => {
                let codepage = u16::from_le_bytes([record.data[0], record.data[1]]);
                globals.encoding = encoding_for(Some(codepage));
            }
            RECORD_BOUNDSHEET => {
                if let Some(sheet) = parse_boundsheet(record.data, biff8, globals.encoding) {
                    globals.sheets.push(sheet);
                }
            }
            RECORD_SST => {
                let mut fragments = vec![record.data];
                while let Some(Ok(next)) = iter.peek() {
                    if next.record_id != RECORD_CONTINUE {
                        break;
                    }
                    fragments.push(next.data);
                    iter.next();
                }
                globals.sst = parse_sst(&fragments);
            }
            RECORD_EOF => {
                globals.end = record.offset + 4 + record.data.len();
                break;
            }
            id if is_bof(id) => {
                globals.end = record.offset;
                break;
            }
            _ => {}
        }
    }
    Ok(globals)
}

fn parse_boundsheet(data: &[u8], biff8: bool, encoding: &'static Encoding) -> Option<BoundSheet> {
    // [lbPlyPos: u32] [hsState: u8] [dt: u8] [stName]
    let substream_offset = u32::from_le_bytes(data.get(0..4)?.try_into().ok()?) as usize;
    let cch = *data.get(6)? as usize;
    let name = if biff8 {
        let flags = *data.get(7)?;
        let chars = data.get(8..)?;
        if flags & STR_FLAG_HIGH_BYTE != 0 {
            decode_bytes(chars.get(..cch * 2)?, UTF_16LE)
        } else {
            decode_latin1(chars.get(..cch)?)
        }
    } else {
        decode_bytes(data.get(7..7 + cch)?, encoding)
    };
    Some(BoundSheet {
        name,
        substream_offset,
    })
}

fn points_at_bof(stream: &[u8], offset: usize) -> bool {
    offset != 0
        && stream
            .get(offset..offset + 2)
            .is_some_and(|id| is_bof(u16::from_le_bytes([id[0], id[1]])))
}

/// Offsets of the sheet substreams following the globals, in stream order.
fn substream_starts(stream: &[u8], globals_end: usize) -> Vec<usize> {
    BiffRecordIter::from_offset(stream, globals_end)
        .map_while(Result::ok)
        .filter(|r| is_bof(r.record_id))
        .map(|r| r.offset)
        .collect()
}

fn read_sheet_cells(stream: &[u8], start: usize, globals: &Globals) -> Vec<BiffCell> {
    let mut cells = Vec::new();
    for (idx, record) in BiffRecordIter::from_offset(stream, start).enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                log::warn!("stopping sheet scan: {err}");
                break;
            }
        };
        if idx > 0 && is_bof(record.record_id) {
            // Next substream: the writer omitted this sheet's EOF.
            break;
        }
        match record.record_id {
            RECORD_EOF => break,
            RECORD_LABELSST => {
                if let Some(cell) = parse_labelsst(record.data, &globals.sst) {
                    cells.push(cell);
                }
            }
            RECORD_LABEL => {
                if let Some(cell) = parse_label(record.data, globals.biff8, globals.encoding) {
                    cells.push(cell);
                }
            }
            _ => {}
        }
    }
    cells
}

fn cell_position(data: &[u8]) -> Option<(u32, u32)> {
    let row = u16::from_le_bytes([*data.first()?, *data.get(1)?]);
    let col = u16::from_le_bytes([*data.get(2)?, *data.get(3)?]);
    Some((row as u32, col as u32))
}

fn parse_labelsst(data: &[u8], sst: &[String]) -> Option<BiffCell> {
    // [rw: u16] [col: u16] [ixfe: u16] [isst: u32]
    let (row, col) = cell_position(data)?;
    let isst = u32::from_le_bytes(data.get(6..10)?.try_into().ok()?) as usize;
    Some(BiffCell {
        row,
        col,
        text: sst.get(isst)?.clone(),
    })
}

fn parse_label(data: &[u8], biff8: bool, encoding: &'static Encoding) -> Option<BiffCell> {
    // [rw: u16] [col: u16] [ixfe: u16] [cch: u16] ...
    let (row, col) = cell_position(data)?;
    let cch = u16::from_le_bytes([*data.get(6)?, *data.get(7)?]) as usize;
    let text = if biff8 {
        let flags = *data.get(8)?;
        let chars = data.get(9..)?;
        if flags & STR_FLAG_HIGH_BYTE != 0 {
            decode_bytes(chars.get(..cch * 2)?, UTF_16LE)
        } else {
            decode_latin1(chars.get(..cch)?)
        }
    } else {
        decode_bytes(data.get(8..8 + cch)?, encoding)
    };
    Some(BiffCell { row, col, text })
}

/// Compressed BIFF8 characters are the low bytes of UTF-16 code units.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_sst(fragments: &[&[u8]]) -> Vec<String> {
    let mut cursor = FragmentCursor::new(fragments);
    // [cstTotal: u32] [cstUnique: u32] [rgb: XLUnicodeRichExtendedString[]]
    let Ok(_total) = cursor.read_u32_le() else {
        return Vec::new();
    };
    let Ok(unique) = cursor.read_u32_le() else {
        return Vec::new();
    };
    let unique = unique as usize;
    let mut out = Vec::with_capacity(unique.min(MAX_SST_PREALLOC));
    for _ in 0..unique {
        match cursor.read_rich_extended_string() {
            Ok(s) => out.push(s),
            Err(err) => {
                log::warn!("shared string table truncated after {} entries: {err}", out.len());
                break;
            }
        }
    }
    out
}

/// Reads across `SST` + `CONTINUE` fragments. A string continued into a new fragment is preceded
/// by a fresh option-flags byte selecting compressed or UTF-16 characters.
struct FragmentCursor<'a> {
    fragments: &'a [&'a [u8]],
    frag_idx: usize,
    offset: usize,
}

impl<'a> FragmentCursor<'a> {
    fn new(fragments: &'a [&'a [u8]]) -> Self {
        Self {
            fragments,
            frag_idx: 0,
            offset: 0,
        }
    }

    fn remaining_in_fragment(&self) -> usize {
        self.fragments
            .get(self.frag_idx)
            .map(|f| f.len().saturating_sub(self.offset))
            .unwrap_or(0)
    }

    fn advance_fragment(&mut self) -> Result<(), String> {
        self.frag_idx += 1;
        self.offset = 0;
        if self.frag_idx >= self.fragments.len() {
            return Err("unexpected end of record".to_string());
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, String> {
        while self.remaining_in_fragment() == 0 {
            self.advance_fragment()?;
        }
        let b = self.fragments[self.frag_idx][self.offset];
        self.offset += 1;
        Ok(b)
    }

    fn read_u16_le(&mut self) -> Result<u16, String> {
        Ok(u16::from_le_bytes([self.read_u8()?, self.read_u8()?]))
    }

    fn read_u32_le(&mut self) -> Result<u32, String> {
        Ok(u32::from_le_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    fn skip_bytes(&mut self, mut n: usize) -> Result<(), String> {
        while n > 0 {
            let available = self.remaining_in_fragment();
            if available == 0 {
                self.advance_fragment()?;
                continue;
            }
            let take = n.min(available);
            self.offset += take;
            n -= take;
        }
        Ok(())
    }

    fn read_chars(&mut self, cch: usize, mut is_unicode: bool, out: &mut String) -> Result<(), String> {
        let mut remaining = cch;
        while remaining > 0 {
            if self.remaining_in_fragment() == 0 {
                self.advance_fragment()?;
                is_unicode = self.read_u8()? & STR_FLAG_HIGH_BYTE != 0;
                continue;
            }
            let width = if is_unicode { 2 } else { 1 };
            let available = self.remaining_in_fragment() / width;
            if available == 0 {
                return Err("string continuation split mid-character".to_string());
            }
            let take = remaining.min(available);
            let frag = self.fragments[self.frag_idx];
            let bytes = &frag[self.offset..self.offset + take * width];
            if is_unicode {
                out.push_str(&decode_bytes(bytes, UTF_16LE));
            } else {
                out.push_str(&decode_latin1(bytes));
            }
            self.offset += take * width;
            remaining -= take;
        }
        Ok(())
    }

    fn read_rich_extended_string(&mut self) -> Result<String, String> {
        let cch = self.read_u16_le()? as usize;
        let flags = self.read_u8()?;
        let runs = if flags & STR_FLAG_RICH_TEXT != 0 {
            self.read_u16_le()? as usize
        } else {
            0
        };
        let ext = if flags & STR_FLAG_EXT != 0 {
            self.read_u32_le()? as usize
        } else {
            0
        };
        let mut text = String::with_capacity(cch);
        self.read_chars(cch, flags & STR_FLAG_HIGH_BYTE != 0, &mut text)?;
        self.skip_bytes(runs * 4)?;
        self.skip_bytes(ext)?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn bof(dt: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&BIFF8_VERSION.to_le_bytes());
        data.extend_from_slice(&dt.to_le_bytes());
        data.extend_from_slice(&[0u8; 12]);
        record(RECORD_BOF_BIFF8, &data)
    }

    fn boundsheet(name: &str) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0, 0, 0, name.len() as u8, 0];
        data.extend_from_slice(name.as_bytes());
        record(RECORD_BOUNDSHEET, &data)
    }

    fn labelsst(row: u16, col: u16, isst: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&row.to_le_bytes());
        data.extend_from_slice(&col.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&isst.to_le_bytes());
        record(RECORD_LABELSST, &data)
    }

    #[test]
    fn reads_shared_strings_split_across_continue() {
        // "Sub Main()" split after "Sub M"; the continuation switches to UTF-16.
        let mut sst = Vec::new();
        sst.extend_from_slice(&1u32.to_le_bytes());
        sst.extend_from_slice(&1u32.to_le_bytes());
        sst.extend_from_slice(&10u16.to_le_bytes());
        sst.push(0);
        sst.extend_from_slice(b"Sub M");
        let mut cont = vec![STR_FLAG_HIGH_BYTE];
        for unit in "ain()".encode_utf16() {
            cont.extend_from_slice(&unit.to_le_bytes());
        }

        let mut stream = bof(0x0005);
        stream.extend(boundsheet("VBA"));
        stream.extend(record(RECORD_SST, &sst));
        stream.extend(record(RECORD_CONTINUE, &cont));
        stream.extend(record(RECORD_EOF, &[]));
        stream.extend(bof(0x0010));
        stream.extend(labelsst(0, 0, 0));
        stream.extend(labelsst(1, 0, 7));
        stream.extend(record(RECORD_EOF, &[]));

        let sheets = read_sheet_strings(&stream).unwrap();
        assert_eq!(
            sheets,
            vec![BiffSheet {
                name: "VBA".to_string(),
                cells: vec![BiffCell { row: 0, col: 0, text: "Sub Main()".to_string() }],
            }]
        );
    }

    #[test]
    fn rejects_streams_without_bof() {
        assert!(read_sheet_strings(&record(RECORD_EOF, &[])).is_err());
    }

    #[test]
    fn reads_biff5_label_cells_in_the_workbook_codepage() {
        let mut bof5 = Vec::new();
        bof5.extend_from_slice(&0x0500u16.to_le_bytes());
        bof5.extend_from_slice(&0x0005u16.to_le_bytes());
        bof5.extend_from_slice(&[0u8; 4]);

        let mut sheet = vec![0, 0, 0, 0, 0, 0, 3];
        sheet.extend_from_slice(b"VBA");
        let mut label = vec![2, 0, 1, 0, 0, 0];
        label.extend_from_slice(&4u16.to_le_bytes());
        label.extend_from_slice(&[0xCB, 0xE8, 0xF1, 0xF2]);

        let mut stream = record(RECORD_BOF_BIFF8, &bof5);
        stream.extend(record(RECORD_CODEPAGE, &1251u16.to_le_bytes()));
        stream.extend(record(RECORD_BOUNDSHEET, &sheet));
        stream.extend(record(RECORD_EOF, &[]));
        stream.extend(record(RECORD_BOF_BIFF8, &bof5));
        stream.extend(record(RECORD_LABEL, &label));
        stream.extend(record(RECORD_EOF, &[]));

        let sheets = read_sheet_strings(&stream).unwrap();
        assert_eq!(sheets[0].cells, vec![BiffCell { row: 2, col: 1, text: "Лист".to_string() }]);
    }
}
