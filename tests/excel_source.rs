#![cfg(feature = "excel_test_writer")]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rowpack::config::{ExcelSheetSelection, SourceSpec};
use rowpack::load::LoadOptions;
use rowpack::source::{ExcelSource, RowSource};
use rowpack::{Cell, RowStore, ValueType};

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rowpack-{name}-{nanos}.xlsx"))
}

fn write_scores_xlsx(path: &PathBuf) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();

    let notes = wb.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "see the Data sheet").unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("Data").unwrap();
    // title, blank row, header, data
    ws.write_string(0, 0, "Exam scores 2024").unwrap();
    ws.write_string(2, 0, "id").unwrap();
    ws.write_string(2, 1, "name").unwrap();
    ws.write_string(2, 2, "score").unwrap();
    for (i, (name, score)) in [("Ada", 98.5), ("Grace", 87.25), ("Edsger", 91.0)]
        .into_iter()
        .enumerate()
    {
        let row = 3 + i as u32;
        ws.write_number(row, 0, (i + 1) as f64).unwrap();
        ws.write_string(row, 1, name).unwrap();
        ws.write_number(row, 2, score).unwrap();
    }

    wb.save(path).unwrap();
}

#[test]
fn named_sheet_rows_keep_spreadsheet_numbering() {
    let path = tmp_file("scores");
    write_scores_xlsx(&path);

    let mut source =
        ExcelSource::from_path(&path).with_sheets(ExcelSheetSelection::Sheet("Data".into()));
    let rows: Vec<Vec<Cell>> = source.rows().unwrap().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0][0], Cell::from("Exam scores 2024"));
    assert!(rows[1].iter().all(Cell::is_empty));
    assert_eq!(rows[3][0], Cell::Int(1));
    assert_eq!(rows[5][2], Cell::Int(91));

    std::fs::remove_file(&path).ok();
}

#[test]
fn workbook_loads_through_the_pipeline() {
    let path = tmp_file("scores-load");
    write_scores_xlsx(&path);

    let spec = SourceSpec {
        sheets: ExcelSheetSelection::Sheet("Data".into()),
        ..SourceSpec::default()
    };
    let meta = RowStore::memory()
        .container("scores.rpk")
        .load_path(&path, &spec, &LoadOptions::default())
        .unwrap();

    assert_eq!(meta.about.header_rows, vec![3]);
    assert_eq!(meta.about.data_start_row, 4);
    assert_eq!(meta.about.n_rows, 3);
    assert_eq!(meta.about.headers, vec!["id", "name", "score"]);
    assert_eq!(meta.column("id").unwrap().value_type, Some(ValueType::Int));
    assert_eq!(meta.column("score").unwrap().value_type, Some(ValueType::Float));

    std::fs::remove_file(&path).ok();
}
