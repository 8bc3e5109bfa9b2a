//! Round trips through real xlsx files.

use std::io::Read;
use std::path::Path;

use calamine::{Reader, Xlsx, open_workbook};
use plan_io::{DocumentAdapter, XlsxAdapter};
use plan_model::{CellValue, Sheet, Workbook};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

fn plan_workbook() -> Workbook {
    let mut plan = Sheet::new("TestPlan");
    plan.set_cell(16, 1, CellValue::text("Test Case ID"));
    plan.set_cell(17, 1, CellValue::text("TC.LOGIN.001"));
    plan.set_cell(17, 11, CellValue::text("Passed"));
    plan.set_cell(17, 12, CellValue::Number(3.5));
    plan.set_cell(17, 13, CellValue::Bool(true));
    plan.set_cell(18, 1, CellValue::Number(1001.0));

    let mut notes = Sheet::new("Notes");
    notes.set_cell(2, 3, CellValue::text("kept"));

    Workbook::new().with_sheet(plan).with_sheet(notes)
}

#[test]
fn save_then_open_preserves_values_and_sheet_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plan.xlsx");
    let adapter = XlsxAdapter::new();

    adapter
        .save_workbook(&plan_workbook(), &path)
        .expect("save workbook");
    let opened = adapter.open_workbook(&path).expect("open workbook");

    assert_eq!(opened.sheet_names(), vec!["TestPlan", "Notes"]);
    let plan = opened.sheet("TestPlan").expect("plan sheet");
    assert_eq!(plan.cell(16, 1), &CellValue::text("Test Case ID"));
    assert_eq!(plan.cell(17, 1), &CellValue::text("TC.LOGIN.001"));
    assert_eq!(plan.cell(17, 11), &CellValue::text("Passed"));
    assert_eq!(plan.cell(17, 12), &CellValue::Number(3.5));
    assert_eq!(plan.cell(17, 13), &CellValue::Bool(true));
    assert_eq!(plan.cell(18, 1).key_text().as_deref(), Some("1001"));
    assert_eq!(plan.cell(17, 14), &CellValue::Empty);
    assert_eq!(plan.max_row(), 18);

    let notes = opened.sheet("Notes").expect("notes sheet");
    assert_eq!(notes.cell(2, 3), &CellValue::text("kept"));
    assert_eq!(notes.cell(1, 1), &CellValue::Empty);
}

#[test]
fn opening_missing_file_is_file_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let error = XlsxAdapter::new()
        .open_workbook(&dir.path().join("absent.xlsx"))
        .unwrap_err();
    assert!(error.is_file_not_found());
}

#[test]
fn opening_garbage_is_a_spreadsheet_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.xlsx");
    std::fs::write(&path, b"not a workbook").expect("write");
    let error = XlsxAdapter::new().open_workbook(&path).unwrap_err();
    assert!(!error.is_file_not_found());
}

/// A plan authored by hand: header, one test row with a formula next to the
/// key, and a date in the first payload column.
fn write_authored_plan(path: &Path) {
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("TestPlan").expect("name");
    let bold = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    sheet
        .write_string_with_format(15, 0, "Test Case ID", &bold)
        .expect("header");
    sheet.write_string(16, 0, "TC.LOGIN.001").expect("key");
    sheet.write_formula(16, 1, "=LEN(A17)").expect("formula");
    sheet
        .write_number_with_format(16, 10, 45000.0, &date)
        .expect("date");
    sheet.write_string(17, 0, "TC.LOGIN.002").expect("key");
    workbook.save(path).expect("save authored plan");
}

fn part_bytes(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("open package");
    let mut archive = zip::ZipArchive::new(file).expect("zip");
    let mut part = archive.by_name(name).expect("part");
    let mut bytes = Vec::new();
    part.read_to_end(&mut bytes).expect("read part");
    bytes
}

#[test]
fn formulas_outside_the_payload_survive_a_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plan.xlsx");
    write_authored_plan(&path);
    let adapter = XlsxAdapter::new();

    let mut opened = adapter.open_workbook(&path).expect("open");
    opened
        .sheet_mut("TestPlan")
        .expect("sheet")
        .set_cell(17, 12, CellValue::text("Passed"));
    adapter.save_workbook(&opened, &path).expect("save");

    let mut reread: Xlsx<_> = open_workbook(&path).expect("reopen");
    let formulas = reread.worksheet_formula("TestPlan").expect("formulas");
    assert_eq!(
        formulas.get_value((16, 1)).map(String::as_str),
        Some("LEN(A17)")
    );
    let values = reread.worksheet_range("TestPlan").expect("values");
    assert_eq!(
        values.get_value((16, 11)),
        Some(&calamine::Data::String("Passed".to_string()))
    );
}

#[test]
fn dates_stay_dates_when_copied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("plan.xlsx");
    let output = dir.path().join("out.xlsx");
    write_authored_plan(&source);
    let adapter = XlsxAdapter::new();

    let mut opened = adapter.open_workbook(&source).expect("open");
    let sheet = opened.sheet_mut("TestPlan").expect("sheet");
    assert_eq!(sheet.cell(17, 11), &CellValue::DateTime(45000.0));
    sheet.set_cell(18, 11, CellValue::DateTime(45001.5));
    adapter.save_workbook(&opened, &output).expect("save");

    let reread = adapter.open_workbook(&output).expect("reopen");
    let sheet = reread.sheet("TestPlan").expect("sheet");
    assert_eq!(sheet.cell(17, 11), &CellValue::DateTime(45000.0));
    assert_eq!(sheet.cell(18, 11), &CellValue::DateTime(45001.5));
}

#[test]
fn dates_in_new_workbooks_get_a_date_format() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fresh.xlsx");
    let mut plan = Sheet::new("TestPlan");
    plan.set_cell(1, 1, CellValue::DateTime(45000.0));
    plan.set_cell(1, 2, CellValue::DateTime(0.25));
    let adapter = XlsxAdapter::new();

    adapter
        .save_workbook(&Workbook::new().with_sheet(plan), &path)
        .expect("save");

    let reread = adapter.open_workbook(&path).expect("reopen");
    let sheet = reread.sheet("TestPlan").expect("sheet");
    assert_eq!(sheet.cell(1, 1), &CellValue::DateTime(45000.0));
    assert_eq!(sheet.cell(1, 2), &CellValue::DateTime(0.25));
}

#[test]
fn saving_text_leaves_styles_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("plan.xlsx");
    let output = dir.path().join("out.xlsx");
    write_authored_plan(&source);
    let before = std::fs::read(&source).expect("read source");
    let adapter = XlsxAdapter::new();

    let mut opened = adapter.open_workbook(&source).expect("open");
    opened
        .sheet_mut("TestPlan")
        .expect("sheet")
        .set_cell(18, 11, CellValue::text("Failed"));
    adapter.save_workbook(&opened, &output).expect("save");

    assert_eq!(std::fs::read(&source).expect("reread source"), before);
    assert_eq!(
        part_bytes(&output, "xl/styles.xml"),
        part_bytes(&source, "xl/styles.xml")
    );
    let reread = adapter.open_workbook(&output).expect("reopen");
    let sheet = reread.sheet("TestPlan").expect("sheet");
    assert_eq!(sheet.cell(18, 11), &CellValue::text("Failed"));
    assert_eq!(sheet.cell(16, 1), &CellValue::text("Test Case ID"));
}
