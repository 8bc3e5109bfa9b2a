//! Cell edits applied to an existing xlsx package.
//!
//! The package is copied entry by entry. Worksheet parts holding edited cells
//! are rewritten with only the edited `<c>` elements replaced or inserted, and
//! every other entry is copied raw. `styles.xml` changes only when a date lands
//! in a cell whose style has no date number format. The calc chain is dropped
//! when an edit replaced a formula, so Excel rebuilds it on load.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use plan_model::CellValue;

const ROOT_RELS_PART: &str = "_rels/.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_STYLES: &str = "/styles";
const REL_CALC_CHAIN: &str = "/calcChain";

/// Built-in number formats `m/d/yyyy`, `h:mm:ss` and `m/d/yyyy h:mm`.
const NUM_FMT_DATE: u32 = 14;
const NUM_FMT_TIME: u32 = 21;
const NUM_FMT_DATE_TIME: u32 = 22;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("sheet '{0}' is not part of the workbook")]
    MissingSheet(String),
    #[error("package part not found: {0}")]
    MissingPart(String),
    #[error("invalid package: {0}")]
    Invalid(String),
}

/// New value for one cell. Row and column are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub row: u32,
    pub column: u32,
    pub value: CellValue,
}

impl CellEdit {
    pub fn new(row: u32, column: u32, value: CellValue) -> Self {
        Self { row, column, value }
    }
}

/// Cell edits grouped by sheet (tab) name.
#[derive(Debug, Clone, Default)]
pub struct PackageEdits {
    sheets: Vec<(String, Vec<CellEdit>)>,
}

impl PackageEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sheet(&mut self, sheet: impl Into<String>, edits: Vec<CellEdit>) {
        if !edits.is_empty() {
            self.sheets.push((sheet.into(), edits));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.sheets.iter().map(|(_, edits)| edits.len()).sum()
    }

    fn has_dates(&self) -> bool {
        self.sheets
            .iter()
            .flat_map(|(_, edits)| edits)
            .any(|edit| matches!(edit.value, CellValue::DateTime(_)))
    }
}

/// What one patch touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub cells: usize,
    pub parts_rewritten: usize,
    pub formulas_replaced: usize,
}

/// Copy the package at `input` to `output`, applying `edits` on the way.
///
/// `input` and `output` may be the same file. The new package is written to
/// a temporary file next to `output` and renamed over it once complete.
pub fn patch_package(
    input: &Path,
    output: &Path,
    edits: &PackageEdits,
) -> Result<PatchSummary, PatchError> {
    let file = File::open(input)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut summary = PatchSummary::default();
    let mut replaced: HashMap<String, Vec<u8>> = HashMap::new();
    let mut dropped: Vec<String> = Vec::new();

    if !edits.is_empty() {
        let workbook_part = office_document_part(&mut archive)?;
        let workbook_xml = require_part(&mut archive, &workbook_part)?;
        let rels_part = rels_part_for(&workbook_part);
        let rels_xml = require_part(&mut archive, &rels_part)?;
        let sheets = parse_workbook_sheets(&workbook_xml)?;
        let relationships = parse_relationships(&rels_xml)?;

        let styles_part = relationships
            .iter()
            .find(|rel| rel.kind.ends_with(REL_STYLES))
            .map(|rel| resolve_target(&workbook_part, &rel.target));
        let styles_xml = match &styles_part {
            Some(part) if edits.has_dates() => read_part(&mut archive, part)?,
            _ => None,
        };
        let mut styles = match &styles_xml {
            Some(xml) => StyleBook::parse(xml)?,
            None => StyleBook::unavailable(),
        };

        for (sheet_name, cells) in &edits.sheets {
            let rel_id = sheets
                .iter()
                .find(|(name, _)| name == sheet_name)
                .map(|(_, rel_id)| rel_id)
                .ok_or_else(|| PatchError::MissingSheet(sheet_name.clone()))?;
            let relationship = relationships
                .iter()
                .find(|rel| &rel.id == rel_id)
                .ok_or_else(|| {
                    PatchError::Invalid(format!(
                        "sheet '{sheet_name}' points at unknown relationship {rel_id}"
                    ))
                })?;
            let part = resolve_target(&workbook_part, &relationship.target);
            let xml = require_part(&mut archive, &part)?;
            let patched = patch_worksheet(&xml, cells, &mut styles)?;
            debug!(
                sheet = %sheet_name,
                part = %part,
                cells = cells.len(),
                "patched worksheet"
            );
            summary.cells += cells.len();
            summary.formulas_replaced += patched.formulas_replaced;
            replaced.insert(part, patched.xml);
        }

        if let (Some(part), Some(xml)) = (&styles_part, &styles_xml)
            && styles.is_dirty()
        {
            replaced.insert(part.clone(), styles.write(xml)?);
        }

        if summary.formulas_replaced > 0
            && let Some(rel) = relationships
                .iter()
                .find(|rel| rel.kind.ends_with(REL_CALC_CHAIN))
        {
            let part = resolve_target(&workbook_part, &rel.target);
            let rel_id = rel.id.clone();
            replaced.insert(
                rels_part.clone(),
                remove_elements(&rels_xml, b"Relationship", |e| {
                    Ok(attr_value(e, b"Id")?.as_deref() == Some(rel_id.as_str()))
                })?,
            );
            if let Some(types) = read_part(&mut archive, CONTENT_TYPES_PART)? {
                let part_name = format!("/{part}");
                replaced.insert(
                    CONTENT_TYPES_PART.to_string(),
                    remove_elements(&types, b"Override", |e| {
                        Ok(attr_value(e, b"PartName")?.as_deref() == Some(part_name.as_str()))
                    })?,
                );
            }
            debug!(part = %part, "dropping calc chain after formula cells were overwritten");
            dropped.push(part);
        }
        summary.parts_rewritten = replaced.len();
    }

    write_package(archive, output, &replaced, &dropped)?;
    Ok(summary)
}

fn write_package<R: Read + Seek>(
    mut archive: ZipArchive<R>,
    output: &Path,
    replaced: &HashMap<String, Vec<u8>>,
    dropped: &[String],
) -> Result<(), PatchError> {
    let dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            if dropped.contains(&name) {
                continue;
            }
            match replaced.get(&name) {
                Some(bytes) => {
                    zip.start_file(name, options)?;
                    zip.write_all(bytes)?;
                }
                // Raw copy keeps unchanged parts byte for byte, compression included.
                None => zip.raw_copy_file(file)?,
            }
        }
        zip.finish()?;
    }
    // The input may be the output; release it before the rename.
    drop(archive);
    if let Ok(metadata) = fs::metadata(output) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.persist(output).map_err(|error| error.error)?;
    Ok(())
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, PatchError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn require_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, PatchError> {
    read_part(archive, name)?.ok_or_else(|| PatchError::MissingPart(name.to_string()))
}

fn office_document_part<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, PatchError> {
    let Some(xml) = read_part(archive, ROOT_RELS_PART)? else {
        return Ok(DEFAULT_WORKBOOK_PART.to_string());
    };
    Ok(parse_relationships(&xml)?
        .into_iter()
        .find(|rel| rel.kind.ends_with(REL_OFFICE_DOCUMENT))
        .map_or_else(
            || DEFAULT_WORKBOOK_PART.to_string(),
            |rel| resolve_target("", &rel.target),
        ))
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map_or(target, |(path, _)| path);
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(absolute) => (absolute, ""),
        None => (
            target,
            base_part.rsplit_once('/').map_or("", |(dir, _)| dir),
        ),
    };
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, PatchError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let external = attr_value(&e, b"TargetMode")?.as_deref() == Some("External");
                let fields = (
                    attr_value(&e, b"Id")?,
                    attr_value(&e, b"Type")?,
                    attr_value(&e, b"Target")?,
                );
                if !external && let (Some(id), Some(kind), Some(target)) = fields {
                    relationships.push(Relationship { id, kind, target });
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<(String, String)>, PatchError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match (attr.key.prefix().is_some(), attr.key.local_name().as_ref()) {
                        (false, b"name") => name = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned()),
                        (true, b"id") => rel_id = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// Drop every `local` element for which `should_remove` holds, children included.
fn remove_elements<F>(xml: &[u8], local: &[u8], should_remove: F) -> Result<Vec<u8>, PatchError>
where
    F: Fn(&BytesStart<'_>) -> Result<bool, PatchError>,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.local_name().as_ref() == local && should_remove(&e)? => {}
            Event::Start(e) if e.local_name().as_ref() == local && should_remove(&e)? => {
                skip_children(&mut reader)?;
            }
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, PatchError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.decode_and_unescape_value(e.decoder())?.into_owned()));
        }
    }
    Ok(None)
}

fn attr_u32(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<u32>, PatchError> {
    Ok(attr_value(e, key)?.and_then(|value| value.trim().parse().ok()))
}

/// Consume events up to the end tag of the element just opened. Returns true
/// when a formula (`<f>`) was among the skipped children.
fn skip_children(reader: &mut Reader<&[u8]>) -> Result<bool, PatchError> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut had_formula = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"f" {
                    had_formula = true;
                    warn_on_shared_master(&e)?;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"f" {
                    had_formula = true;
                }
            }
            Event::End(_) if depth == 0 => return Ok(had_formula),
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(PatchError::Invalid(
                    "xml ends inside an element".to_string(),
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

fn warn_on_shared_master(formula: &BytesStart<'_>) -> Result<(), PatchError> {
    if attr_value(formula, b"t")?.as_deref() == Some("shared")
        && let Some(range) = attr_value(formula, b"ref")?
    {
        warn!(
            range = %range,
            "overwrote the anchor of a shared formula; other cells in the range keep their cached values"
        );
    }
    Ok(())
}

struct PatchedSheet {
    xml: Vec<u8>,
    formulas_replaced: usize,
}

type RowEdits<'e> = BTreeMap<u32, &'e CellValue>;

struct OpenRow<'e> {
    row: u32,
    cells: RowEdits<'e>,
    last_column: u32,
}

/// Rewrite one worksheet part, touching only the edited cells.
fn patch_worksheet(
    xml: &[u8],
    edits: &[CellEdit],
    styles: &mut StyleBook,
) -> Result<PatchedSheet, PatchError> {
    let mut rows: BTreeMap<u32, RowEdits<'_>> = BTreeMap::new();
    for edit in edits {
        rows.entry(edit.row)
            .or_default()
            .insert(edit.column, &edit.value);
    }
    let bounds = EditBounds::of(edits);

    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64 * edits.len()));
    let mut buf = Vec::new();
    let mut prefix: Option<String> = None;
    let mut in_sheet_data = false;
    let mut last_row = 0u32;
    let mut open_row: Option<OpenRow<'_>> = None;
    let mut formulas_replaced = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,

            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                writer.write_event(Event::Empty(widen_dimension(&e, bounds)?))?;
            }

            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                prefix = name_prefix(e.name())?;
                in_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                prefix = name_prefix(e.name())?;
                if rows.is_empty() {
                    writer.write_event(Event::Empty(e))?;
                } else {
                    let tag = qualified(prefix.as_deref(), "sheetData");
                    writer.write_event(Event::Start(e))?;
                    write_new_rows(&mut writer, prefix.as_deref(), &mut rows, u32::MAX, styles)?;
                    writer.write_event(Event::End(BytesEnd::new(tag)))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                write_new_rows(&mut writer, prefix.as_deref(), &mut rows, u32::MAX, styles)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = attr_u32(&e, b"r")?.unwrap_or(last_row + 1);
                last_row = row;
                write_new_rows(&mut writer, prefix.as_deref(), &mut rows, row, styles)?;
                match rows.remove(&row) {
                    Some(cells) => {
                        writer.write_event(Event::Start(widen_row_spans(&e, &cells)?))?;
                        open_row = Some(OpenRow {
                            row,
                            cells,
                            last_column: 0,
                        });
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = attr_u32(&e, b"r")?.unwrap_or(last_row + 1);
                last_row = row;
                write_new_rows(&mut writer, prefix.as_deref(), &mut rows, row, styles)?;
                match rows.remove(&row) {
                    Some(mut cells) => {
                        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(widen_row_spans(&e, &cells)?))?;
                        write_new_cells(
                            &mut writer,
                            prefix.as_deref(),
                            row,
                            &mut cells,
                            u32::MAX,
                            styles,
                        )?;
                        writer.write_event(Event::End(BytesEnd::new(tag)))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(mut open) = open_row.take() {
                    write_new_cells(
                        &mut writer,
                        prefix.as_deref(),
                        open.row,
                        &mut open.cells,
                        u32::MAX,
                        styles,
                    )?;
                }
                writer.write_event(Event::End(e))?;
            }

            Event::Start(e) if e.local_name().as_ref() == b"c" && open_row.is_some() => {
                let open = open_row.as_mut().ok_or_else(unexpected_cell)?;
                let column = cell_column(&e)?.unwrap_or(open.last_column + 1);
                open.last_column = column;
                write_new_cells(
                    &mut writer,
                    prefix.as_deref(),
                    open.row,
                    &mut open.cells,
                    column,
                    styles,
                )?;
                match open.cells.remove(&column) {
                    Some(value) => {
                        if skip_children(&mut reader)? {
                            formulas_replaced += 1;
                        }
                        write_cell(
                            &mut writer,
                            prefix.as_deref(),
                            Some(&e),
                            open.row,
                            column,
                            value,
                            styles,
                        )?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" && open_row.is_some() => {
                let open = open_row.as_mut().ok_or_else(unexpected_cell)?;
                let column = cell_column(&e)?.unwrap_or(open.last_column + 1);
                open.last_column = column;
                write_new_cells(
                    &mut writer,
                    prefix.as_deref(),
                    open.row,
                    &mut open.cells,
                    column,
                    styles,
                )?;
                match open.cells.remove(&column) {
                    Some(value) => write_cell(
                        &mut writer,
                        prefix.as_deref(),
                        Some(&e),
                        open.row,
                        column,
                        value,
                        styles,
                    )?,
                    None => writer.write_event(Event::Empty(e))?,
                }
            }

            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    if !rows.is_empty() {
        return Err(PatchError::Invalid(
            "worksheet has no <sheetData> section".to_string(),
        ));
    }
    Ok(PatchedSheet {
        xml: writer.into_inner(),
        formulas_replaced,
    })
}

fn unexpected_cell() -> PatchError {
    PatchError::Invalid("cell outside of a row".to_string())
}

/// Write edited rows numbered below `before`, in order.
fn write_new_rows<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    rows: &mut BTreeMap<u32, RowEdits<'_>>,
    before: u32,
    styles: &mut StyleBook,
) -> Result<(), PatchError> {
    let tag = qualified(prefix, "row");
    while let Some(entry) = rows.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let (row, mut cells) = entry.remove_entry();
        let mut start = BytesStart::new(tag.as_str());
        start.push_attribute(("r", row.to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        write_new_cells(writer, prefix, row, &mut cells, u32::MAX, styles)?;
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }
    Ok(())
}

/// Write edited cells of `row` in columns below `before`, in order.
fn write_new_cells<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    row: u32,
    cells: &mut RowEdits<'_>,
    before: u32,
    styles: &mut StyleBook,
) -> Result<(), PatchError> {
    while let Some(entry) = cells.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let (column, value) = entry.remove_entry();
        write_cell(writer, prefix, None, row, column, value, styles)?;
    }
    Ok(())
}

/// Write one `<c>` element. When `original` is given its tag and attributes
/// are kept, except the type and value metadata that belonged to the old value.
fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    original: Option<&BytesStart<'_>>,
    row: u32,
    column: u32,
    value: &CellValue,
    styles: &mut StyleBook,
) -> Result<(), PatchError> {
    let tag = match original {
        Some(e) => String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        None => qualified(prefix, "c"),
    };
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("r", cell_reference(row, column).as_str()));
    let mut style = None;
    if let Some(e) = original {
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"r" | b"t" | b"vm" | b"cm" => {}
                b"s" => style = std::str::from_utf8(&attr.value).ok().and_then(|v| v.parse().ok()),
                _ => start.push_attribute(attr),
            }
        }
    }
    if let CellValue::DateTime(serial) = value {
        style = styles.date_style(style, *serial)?;
    }
    if let Some(style) = style.filter(|&s| s != 0) {
        start.push_attribute(("s", style.to_string().as_str()));
    }

    match value {
        CellValue::Empty => writer.write_event(Event::Empty(start))?,
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            let is_tag = qualified(prefix, "is");
            let t_tag = qualified(prefix, "t");
            writer.write_event(Event::Start(BytesStart::new(is_tag.as_str())))?;
            let mut t = BytesStart::new(t_tag.as_str());
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(t_tag.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(is_tag.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        }
        CellValue::Number(number) | CellValue::DateTime(number) if number.is_finite() => {
            write_value(writer, prefix, start, &tag, None, &number.to_string())?;
        }
        CellValue::Number(_) | CellValue::DateTime(_) => {
            write_value(writer, prefix, start, &tag, Some("e"), "#NUM!")?;
        }
        CellValue::Bool(flag) => {
            write_value(writer, prefix, start, &tag, Some("b"), if *flag { "1" } else { "0" })?;
        }
        CellValue::Error(text) => {
            write_value(writer, prefix, start, &tag, Some("e"), text)?;
        }
    }
    Ok(())
}

fn write_value<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    mut start: BytesStart<'_>,
    tag: &str,
    kind: Option<&str>,
    text: &str,
) -> Result<(), PatchError> {
    if let Some(kind) = kind {
        start.push_attribute(("t", kind));
    }
    let v_tag = qualified(prefix, "v");
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new(v_tag.as_str())))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(v_tag.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn widen_row_spans(
    e: &BytesStart<'_>,
    cells: &RowEdits<'_>,
) -> Result<BytesStart<'static>, PatchError> {
    let mut start = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let first = cells.keys().next().copied();
    let last = cells.keys().next_back().copied();
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"spans"
            && let (Some(first), Some(last)) = (first, last)
            && let Some((low, high)) = std::str::from_utf8(&attr.value)
                .ok()
                .and_then(|spans| spans.split_once(':'))
            && let (Ok(low), Ok(high)) = (low.parse::<u32>(), high.parse::<u32>())
        {
            let spans = format!("{}:{}", low.min(first), high.max(last));
            start.push_attribute(("spans", spans.as_str()));
        } else {
            start.push_attribute(attr);
        }
    }
    Ok(start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EditBounds {
    first_row: u32,
    last_row: u32,
    first_column: u32,
    last_column: u32,
}

impl EditBounds {
    fn of(edits: &[CellEdit]) -> Option<Self> {
        let mut edits = edits.iter();
        let first = edits.next()?;
        let mut bounds = Self {
            first_row: first.row,
            last_row: first.row,
            first_column: first.column,
            last_column: first.column,
        };
        for edit in edits {
            bounds.first_row = bounds.first_row.min(edit.row);
            bounds.last_row = bounds.last_row.max(edit.row);
            bounds.first_column = bounds.first_column.min(edit.column);
            bounds.last_column = bounds.last_column.max(edit.column);
        }
        Some(bounds)
    }

    fn union(self, other: Self) -> Self {
        Self {
            first_row: self.first_row.min(other.first_row),
            last_row: self.last_row.max(other.last_row),
            first_column: self.first_column.min(other.first_column),
            last_column: self.last_column.max(other.last_column),
        }
    }

    fn parse(reference: &str) -> Option<Self> {
        let (start, end) = reference.split_once(':').unwrap_or((reference, reference));
        let (first_row, first_column) = parse_cell_reference(start)?;
        let (last_row, last_column) = parse_cell_reference(end)?;
        Some(Self {
            first_row,
            last_row,
            first_column,
            last_column,
        })
    }

    fn reference(self) -> String {
        format!(
            "{}:{}",
            cell_reference(self.first_row, self.first_column),
            cell_reference(self.last_row, self.last_column)
        )
    }
}

fn widen_dimension(
    e: &BytesStart<'_>,
    bounds: Option<EditBounds>,
) -> Result<BytesStart<'static>, PatchError> {
    let mut start = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"ref"
            && let Some(edits) = bounds
            && let Some(existing) = std::str::from_utf8(&attr.value)
                .ok()
                .and_then(EditBounds::parse)
        {
            start.push_attribute(("ref", existing.union(edits).reference().as_str()));
        } else {
            start.push_attribute(attr);
        }
    }
    Ok(start)
}

fn cell_column(e: &BytesStart<'_>) -> Result<Option<u32>, PatchError> {
    Ok(attr_value(e, b"r")?
        .as_deref()
        .and_then(parse_cell_reference)
        .map(|(_, column)| column))
}

/// `"K17"` -> `(17, 11)`.
fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let split = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut column = 0u32;
    for letter in letters.bytes() {
        let value = u32::from(letter.to_ascii_uppercase() - b'A') + 1;
        column = column.checked_mul(26)?.checked_add(value)?;
    }
    let row = digits.parse().ok()?;
    Some((row, column))
}

fn cell_reference(row: u32, column: u32) -> String {
    format!("{}{row}", column_name(column))
}

/// 1 -> `A`, 27 -> `AA`.
fn column_name(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let remainder = (column - 1) % 26;
        letters.push(char::from(b'A' + remainder as u8));
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn name_prefix(name: QName<'_>) -> Result<Option<String>, PatchError> {
    name.prefix()
        .map(|prefix| {
            std::str::from_utf8(prefix.as_ref())
                .map(str::to_string)
                .map_err(|e| PatchError::Invalid(format!("element prefix: {e}")))
        })
        .transpose()
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// Cell formats (`cellXfs`) of a styles part, with date variants appended on demand.
#[derive(Debug, Default)]
struct StyleBook {
    available: bool,
    cell_formats: Vec<Vec<Event<'static>>>,
    custom_formats: HashMap<u32, String>,
    appended: Vec<Vec<Event<'static>>>,
    derived: HashMap<(u32, u32), u32>,
}

impl StyleBook {
    fn unavailable() -> Self {
        Self::default()
    }

    fn parse(xml: &[u8]) -> Result<Self, PatchError> {
        let mut book = Self::default();
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut in_cell_xfs = false;
        let mut current: Option<(usize, Vec<Event<'static>>)> = None;
        loop {
            let event = reader.read_event_into(&mut buf)?;
            if let Some((depth, events)) = current.as_mut() {
                match &event {
                    Event::Start(_) => *depth += 1,
                    Event::End(_) => *depth -= 1,
                    Event::Eof => {
                        return Err(PatchError::Invalid(
                            "styles part ends inside a cell format".to_string(),
                        ));
                    }
                    _ => {}
                }
                events.push(event.into_owned());
                if *depth == 0
                    && let Some((_, events)) = current.take()
                {
                    book.cell_formats.push(events);
                }
                buf.clear();
                continue;
            }
            match event {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"numFmt" => {
                    if let (Some(id), Some(code)) =
                        (attr_u32(&e, b"numFmtId")?, attr_value(&e, b"formatCode")?)
                    {
                        book.custom_formats.insert(id, code);
                    }
                }
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                    book.available = true;
                    in_cell_xfs = true;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"cellXfs" => {
                    book.available = true;
                }
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Start(e) if in_cell_xfs && e.local_name().as_ref() == b"xf" => {
                    current = Some((1, vec![Event::Start(e.into_owned())]));
                }
                Event::Empty(e) if in_cell_xfs && e.local_name().as_ref() == b"xf" => {
                    book.cell_formats.push(vec![Event::Empty(e.into_owned())]);
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(book)
    }

    fn is_dirty(&self) -> bool {
        !self.appended.is_empty()
    }

    /// Style index for a date written into a cell currently styled `existing`.
    ///
    /// A style that already formats dates is kept. Otherwise the style is
    /// cloned with a built-in date format, once per base style and format.
    fn date_style(&mut self, existing: Option<u32>, serial: f64) -> Result<Option<u32>, PatchError> {
        if !self.available {
            return Ok(existing);
        }
        let base = existing.unwrap_or(0);
        let Some(entry) = self.cell_formats.get(base as usize) else {
            return Ok(existing);
        };
        if self.is_date_format(number_format_of(entry)?) {
            return Ok(existing);
        }
        let format = date_format_for(serial);
        if let Some(&index) = self.derived.get(&(base, format)) {
            return Ok(Some(index));
        }
        let derived = with_number_format(entry, format)?;
        let index = u32::try_from(self.cell_formats.len() + self.appended.len())
            .map_err(|_| PatchError::Invalid("too many cell formats".to_string()))?;
        self.appended.push(derived);
        self.derived.insert((base, format), index);
        Ok(Some(index))
    }

    fn is_date_format(&self, id: u32) -> bool {
        match id {
            14..=22 | 27..=36 | 45..=47 | 50..=58 => true,
            id => self
                .custom_formats
                .get(&id)
                .is_some_and(|code| is_date_code(code)),
        }
    }

    /// The styles part with appended cell formats and an updated count.
    fn write(&self, xml: &[u8]) -> Result<Vec<u8>, PatchError> {
        let total = self.cell_formats.len() + self.appended.len();
        let mut reader = Reader::from_reader(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len() + 128 * self.appended.len()));
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                    let mut start =
                        BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() != b"count" {
                            start.push_attribute(attr);
                        }
                    }
                    start.push_attribute(("count", total.to_string().as_str()));
                    writer.write_event(Event::Start(start))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => {
                    for entry in &self.appended {
                        for event in entry {
                            writer.write_event(event.borrow())?;
                        }
                    }
                    writer.write_event(Event::End(e))?;
                }
                event => writer.write_event(event)?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }
}

fn number_format_of(entry: &[Event<'static>]) -> Result<u32, PatchError> {
    match entry.first() {
        Some(Event::Start(e) | Event::Empty(e)) => Ok(attr_u32(e, b"numFmtId")?.unwrap_or(0)),
        _ => Ok(0),
    }
}

fn with_number_format(
    entry: &[Event<'static>],
    format: u32,
) -> Result<Vec<Event<'static>>, PatchError> {
    let mut events = entry.to_vec();
    let Some(first) = events.first_mut() else {
        return Ok(events);
    };
    let is_start = matches!(first, Event::Start(_));
    let rebuilt = match &*first {
        Event::Start(e) | Event::Empty(e) => {
            let mut start =
                BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            for attr in e.attributes() {
                let attr = attr?;
                if !matches!(attr.key.as_ref(), b"numFmtId" | b"applyNumberFormat") {
                    start.push_attribute(attr);
                }
            }
            start.push_attribute(("numFmtId", format.to_string().as_str()));
            start.push_attribute(("applyNumberFormat", "1"));
            start
        }
        _ => return Ok(events),
    };
    *first = if is_start {
        Event::Start(rebuilt)
    } else {
        Event::Empty(rebuilt)
    };
    Ok(events)
}

/// Pick date, time or date-time display from the serial value.
fn date_format_for(serial: f64) -> u32 {
    let has_date = serial.floor() > 0.0;
    let has_time = serial.fract().abs() > 0.0001;
    match (has_date, has_time) {
        (true, true) => NUM_FMT_DATE_TIME,
        (false, true) => NUM_FMT_TIME,
        _ => NUM_FMT_DATE,
    }
}

/// True when a custom format code has date or time tokens outside quoted
/// literals and bracketed sections.
fn is_date_code(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    for ch in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            _ if in_quotes || in_brackets => {}
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<dimension ref="A1:K17"/>"#,
        r#"<sheetData>"#,
        r#"<row r="1" spans="1:2"><c r="A1" t="s"><v>0</v></c></row>"#,
        r#"<row r="17" spans="1:11"><c r="A17" t="s"><v>1</v></c>"#,
        r#"<c r="B17"><f>LEN(A17)</f><v>7</v></c>"#,
        r#"<c r="K17" s="3" t="s"><v>2</v></c></row>"#,
        r#"</sheetData>"#,
        r#"<mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>"#,
        r#"</worksheet>"#
    );

    fn patch(edits: &[CellEdit]) -> (String, usize) {
        let mut styles = StyleBook::unavailable();
        let patched = patch_worksheet(SHEET.as_bytes(), edits, &mut styles).expect("patch");
        (
            String::from_utf8(patched.xml).expect("utf8"),
            patched.formulas_replaced,
        )
    }

    #[test]
    fn replaces_only_the_edited_cell() {
        let (xml, formulas) = patch(&[CellEdit::new(17, 11, CellValue::text("Passed"))]);
        assert!(xml.contains(r#"<c r="B17"><f>LEN(A17)</f><v>7</v></c>"#));
        assert!(xml.contains(r#"<c r="K17" s="3" t="inlineStr"><is><t>Passed</t></is></c>"#));
        assert!(xml.contains(r#"<mergeCell ref="A1:B1"/>"#));
        assert!(!xml.contains(r#"t="s"><v>2</v>"#));
        assert_eq!(formulas, 0);
    }

    #[test]
    fn inserts_cells_and_rows_in_order() {
        let (xml, _) = patch(&[
            CellEdit::new(17, 12, CellValue::Number(2.5)),
            CellEdit::new(17, 3, CellValue::Bool(true)),
            CellEdit::new(5, 11, CellValue::text("new row")),
            CellEdit::new(20, 11, CellValue::Error("#N/A".to_string())),
        ]);
        let row_5 = xml.find(r#"<row r="5">"#).expect("row 5 inserted");
        let row_17 = xml.find(r#"<row r="17""#).expect("row 17");
        let row_20 = xml.find(r#"<row r="20">"#).expect("row 20 inserted");
        assert!(row_5 < row_17 && row_17 < row_20);

        let b17 = xml.find(r#"<c r="B17">"#).expect("B17");
        let c17 = xml.find(r#"<c r="C17" t="b"><v>1</v></c>"#).expect("C17");
        let k17 = xml.find(r#"<c r="K17""#).expect("K17");
        let l17 = xml.find(r#"<c r="L17"><v>2.5</v></c>"#).expect("L17");
        assert!(b17 < c17 && c17 < k17 && k17 < l17);

        assert!(xml.contains(r#"<row r="17" spans="1:12">"#));
        assert!(xml.contains(r#"<dimension ref="A1:L20"/>"#));
        assert!(xml.contains(r#"<c r="K20" t="e"><v>#N/A</v></c>"#));
    }

    #[test]
    fn overwriting_a_formula_is_counted() {
        let (xml, formulas) = patch(&[CellEdit::new(17, 2, CellValue::Empty)]);
        assert_eq!(formulas, 1);
        assert!(xml.contains(r#"<c r="B17"/>"#));
        assert!(!xml.contains("LEN(A17)"));
    }

    #[test]
    fn empty_sheet_data_is_expanded() {
        let xml = concat!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            r#"<sheetData/></worksheet>"#
        );
        let mut styles = StyleBook::unavailable();
        let patched = patch_worksheet(
            xml.as_bytes(),
            &[CellEdit::new(2, 1, CellValue::text("x"))],
            &mut styles,
        )
        .expect("patch");
        let xml = String::from_utf8(patched.xml).expect("utf8");
        assert!(xml.contains(
            r#"<sheetData><row r="2"><c r="A2" t="inlineStr"><is><t>x</t></is></c></row></sheetData>"#
        ));
    }

    #[test]
    fn text_is_escaped_and_padding_preserved() {
        let (xml, _) = patch(&[CellEdit::new(17, 11, CellValue::text(" a<b & c "))]);
        assert!(xml.contains(r#"<t xml:space="preserve"> a&lt;b &amp; c </t>"#));
    }

    const STYLES: &str = concat!(
        r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts>"#,
        r#"<cellXfs count="3">"#,
        r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
        r#"<xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
        r#"<xf numFmtId="0" fontId="1" fillId="0" borderId="2" xfId="0"><alignment wrapText="1"/></xf>"#,
        r#"</cellXfs></styleSheet>"#
    );

    #[test]
    fn dates_get_a_date_style_once_per_base_style() {
        let mut styles = StyleBook::parse(STYLES.as_bytes()).expect("styles");
        assert_eq!(styles.date_style(Some(1), 45123.0).expect("style"), Some(1));
        assert_eq!(styles.date_style(Some(2), 45123.0).expect("style"), Some(3));
        assert_eq!(styles.date_style(Some(2), 45124.0).expect("style"), Some(3));
        assert_eq!(styles.date_style(None, 45123.5).expect("style"), Some(4));
        assert!(styles.is_dirty());

        let xml = String::from_utf8(styles.write(STYLES.as_bytes()).expect("write")).expect("utf8");
        assert!(xml.contains(r#"<cellXfs count="5">"#));
        assert!(xml.contains(concat!(
            r#"<xf fontId="1" fillId="0" borderId="2" xfId="0" numFmtId="14" applyNumberFormat="1">"#,
            r#"<alignment wrapText="1"/></xf>"#
        )));
        assert!(xml.contains(
            r#"<xf fontId="0" fillId="0" borderId="0" xfId="0" numFmtId="22" applyNumberFormat="1"/>"#
        ));
    }

    #[test]
    fn date_codes() {
        assert!(is_date_code("yyyy-mm-dd"));
        assert!(is_date_code("[h]:mm"));
        assert!(!is_date_code("0.00"));
        assert!(!is_date_code("\"days\" 0"));
        assert!(!is_date_code("[Red]#,##0"));
        assert!(!is_date_code("General"));
    }

    #[test]
    fn references_and_targets() {
        assert_eq!(cell_reference(17, 11), "K17");
        assert_eq!(column_name(27), "AA");
        assert_eq!(column_name(16_384), "XFD");
        assert_eq!(parse_cell_reference("XFD1048576"), Some((1_048_576, 16_384)));
        assert_eq!(parse_cell_reference("17"), None);
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "../customXml/item1.xml"),
            "customXml/item1.xml"
        );
        assert_eq!(rels_part_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
    }
}
