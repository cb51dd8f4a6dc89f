use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, NaiveTime};
use rowpack::storage::MemoryStorage;
use rowpack::types::ScalarKind;
use rowpack::{Cell, RowFlag, RowGroup, RowStore, RowTag, RowpackError, ValueType};
use serde_json::json;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rowpack-{name}-{nanos}"))
}

fn every_kind() -> Vec<Cell> {
    let day = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
    vec![
        Cell::Null,
        Cell::Bool(false),
        Cell::Int(i64::MIN),
        Cell::Float(-0.125),
        Cell::from("naïve, \"quoted\""),
        Cell::Date(day),
        Cell::Time(NaiveTime::from_hms_opt(7, 30, 0).unwrap()),
        Cell::DateTime(day.and_hms_opt(23, 59, 59).unwrap()),
        Cell::Binary(vec![0xde, 0xad]),
    ]
}

/// Title, blank, header, 3 data rows, blank separator, footnote.
fn write_report(store: &RowStore, location: &str) {
    let mut w = store.container(location).writer().unwrap();
    w.append_row(RowTag::blank(RowGroup::Meta, 1), &[Cell::from("Quarterly report")])
        .unwrap();
    w.append_row(RowTag::blank(RowGroup::Meta, 2), &[]).unwrap();
    w.append_row(RowTag::header(3), &[Cell::from("Region"), Cell::from("Sales (USD)")])
        .unwrap();
    for (n, (region, sales)) in [(4, ("north", 10)), (5, ("south", 20)), (6, ("east", 30))] {
        w.append_row(RowTag::data(n), &[Cell::from(region), Cell::Int(sales)])
            .unwrap();
    }
    w.append_row(RowTag::blank(RowGroup::Data, 7), &[]).unwrap();
    w.append_row(RowTag::blank(RowGroup::Data, 8), &[Cell::from("* preliminary")])
        .unwrap();
    w.finalize().unwrap();
}

#[test]
fn every_cell_kind_round_trips() {
    let store = RowStore::memory();
    let container = store.container("kinds.rpk");
    let mut w = container.writer().unwrap();
    w.insert_row(&every_kind()).unwrap();
    let meta = w.finalize().unwrap();
    assert_eq!(meta.about.n_cols, 9);
    assert_eq!(meta.about.headers[0], "col1");

    let r = container.reader().unwrap();
    let rows: Vec<Vec<Cell>> = r.rows().unwrap().map(Result::unwrap).collect();
    assert_eq!(rows, vec![every_kind()]);
    assert_eq!(rows[0][8].kind(), ScalarKind::Binary);
}

#[test]
fn boundaries_and_flags_survive_storage() {
    let store = RowStore::memory();
    write_report(&store, "report.rpk");

    let r = store.container("report.rpk").reader().unwrap();
    assert_eq!(r.n_records(), 8);
    assert_eq!(r.n_rows(), 3);
    assert_eq!(r.data_start_row(), 4);
    assert_eq!(r.data_end_row(), 6);
    assert_eq!(r.meta().about.header_rows, vec![3]);
    assert_eq!(r.headers(), ["region", "sales_usd"]);

    let flags: String = r
        .raw()
        .unwrap()
        .map(|rec| rec.unwrap().tag.flag.as_char())
        .collect();
    assert_eq!(flags, "BBHDDDBB");

    let regions: Vec<String> = r
        .iter()
        .unwrap()
        .map(|p| p.unwrap()["region"].to_string())
        .collect();
    assert_eq!(regions, vec!["north", "south", "east"]);

    let last = r.raw().unwrap().last().unwrap().unwrap();
    assert_eq!(last.tag, RowTag::new(RowGroup::Data, 8, RowFlag::Blank));
    assert_eq!(last.values, vec![Cell::from("* preliminary")]);
}

#[test]
fn cursor_decodes_only_requested_cells() {
    let store = RowStore::memory();
    write_report(&store, "report.rpk");
    let r = store.container("report.rpk").reader().unwrap();

    let mut cursor = r.cursor().unwrap();
    let mut sales = Vec::new();
    while let Some(view) = cursor.next_record().unwrap() {
        if view.tag().flag == RowFlag::Data {
            sales.push(view.cell(1).unwrap());
        }
    }
    assert_eq!(sales, vec![Some(Cell::Int(10)), Some(Cell::Int(20)), Some(Cell::Int(30))]);
}

#[test]
fn metadata_edits_are_idempotent_and_leave_rows_alone() {
    let mem = MemoryStorage::new();
    let store = RowStore::new(mem.clone());
    write_report(&store, "report.rpk");
    let container = store.container("report.rpk");
    let before_len = mem.len_of("report.rpk").unwrap();
    let rows_before: Vec<_> = container.reader().unwrap().raw().unwrap().map(Result::unwrap).collect();

    for _ in 0..2 {
        let mut ed = container.edit_metadata().unwrap();
        ed.column("sales_usd")
            .unwrap()
            .set_type(ValueType::Int)
            .set_description("Net sales");
        ed.column(1usize)
            .unwrap()
            .set("unit", json!("region code"))
            .unwrap();
        ed.meta_mut()
            .source
            .extra
            .insert("license".into(), json!("CC-BY"));
        ed.commit().unwrap();
    }

    assert_eq!(mem.len_of("report.rpk").unwrap(), before_len);
    let r = container.reader().unwrap();
    let rows_after: Vec<_> = r.raw().unwrap().map(Result::unwrap).collect();
    assert_eq!(rows_before, rows_after);

    let sales = r.column("sales_usd").unwrap();
    assert_eq!(sales.value_type, Some(ValueType::Int));
    assert_eq!(sales.description.as_deref(), Some("Net sales"));
    assert_eq!(r.column(1usize).unwrap().extra["unit"], json!("region code"));
    assert_eq!(r.meta().source.extra["license"], json!("CC-BY"));
}

#[test]
fn edit_rewrites_only_metadata_bytes_on_disk() {
    let root = tmp_dir("edit");
    let store = RowStore::local(&root);
    write_report(&store, "nested/report.rpk");
    let path = root.join("nested/report.rpk");
    let container = store.container("nested/report.rpk");

    let (rows_offset, rows_end) = {
        let r = container.reader().unwrap();
        let h = r.file_header();
        (h.rows_offset as usize, h.rows_end() as usize)
    };
    let before = fs::read(&path).unwrap();

    let mut ed = container.edit_metadata().unwrap();
    ed.set_headers(&["area", "sales"]).unwrap();
    ed.commit().unwrap();

    let after = fs::read(&path).unwrap();
    assert_eq!(before[rows_offset..rows_end], after[rows_offset..rows_end]);
    assert_eq!(container.info().unwrap().about.headers, vec!["area", "sales"]);

    fs::remove_dir_all(&root).ok();
}

#[test]
fn handles_are_exclusive_per_location() {
    let store = RowStore::memory();
    write_report(&store, "report.rpk");
    let container = store.container("report.rpk");

    let r1 = container.reader().unwrap();
    let r2 = container.reader().unwrap();
    assert!(matches!(
        container.writer().unwrap_err(),
        RowpackError::AlreadyOpen { .. }
    ));
    assert!(matches!(
        container.edit_metadata().unwrap_err(),
        RowpackError::AlreadyOpen { .. }
    ));
    drop(r1);
    r2.close();

    let w = store.container("other.rpk").writer().unwrap();
    assert!(matches!(
        store.container("other.rpk").reader().unwrap_err(),
        RowpackError::AlreadyOpen { .. }
    ));
    w.abort().unwrap();

    container.remove().unwrap();
    assert!(matches!(
        container.reader().unwrap_err(),
        RowpackError::NotFound { .. }
    ));
}

#[test]
fn unsealed_file_reads_as_not_finalized() {
    let root = tmp_dir("unsealed");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("crashed.rpk"), vec![0u8; 4096]).unwrap();

    let err = RowStore::local(&root)
        .container("crashed.rpk")
        .reader()
        .unwrap_err();
    assert!(matches!(err, RowpackError::NotFinalized { .. }));

    fs::remove_dir_all(&root).ok();
}

#[test]
fn flipped_bytes_are_detected() {
    let root = tmp_dir("corrupt");
    let store = RowStore::local(&root);
    write_report(&store, "report.rpk");
    let path = root.join("report.rpk");
    let pristine = fs::read(&path).unwrap();

    // Header field, then the first metadata byte.
    for offset in [20usize, 128] {
        let mut bytes = pristine.clone();
        bytes[offset] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        let err = store.container("report.rpk").reader().unwrap_err();
        assert!(
            matches!(err, RowpackError::Corrupt { .. }),
            "offset {offset}: {err}"
        );
    }

    fs::remove_dir_all(&root).ok();
}

#[test]
fn non_finite_floats_leave_stats_readable() {
    let store = RowStore::memory();
    let container = store.container("readings.rpk");
    let mut w = container.writer().unwrap();
    w.set_headers(&["sensor", "reading"]).unwrap();
    w.set_column_types([("reading", ValueType::Float)]).unwrap();
    for (name, x) in [
        ("a", 1.5),
        ("b", f64::INFINITY),
        ("c", f64::NAN),
        ("d", f64::NEG_INFINITY),
        ("e", 2.5),
    ] {
        w.insert_row(&[Cell::from(name), Cell::Float(x)]).unwrap();
    }
    w.finalize().unwrap();

    let stats = container.run_stats().unwrap();
    let meta = container.info().unwrap();
    assert_eq!(meta.stats, stats);

    let reading = meta.stats_for("reading").unwrap();
    assert_eq!(reading.count, 5);
    assert_eq!(reading.nulls, 1);
    assert_eq!(reading.numeric_count, 2);
    assert_eq!(reading.mean, Some(2.0));
    assert_eq!(reading.min, Some(Cell::Float(1.5)));
    assert_eq!(reading.max, Some(Cell::Float(2.5)));

    let values: Vec<Cell> = container
        .reader()
        .unwrap()
        .rows()
        .unwrap()
        .map(|row| row.unwrap()[1].clone())
        .collect();
    assert_eq!(values[1], Cell::Float(f64::INFINITY));
    assert!(matches!(values[2], Cell::Float(x) if x.is_nan()));
}

#[test]
fn repeated_edits_keep_the_file_compact() {
    let mem = MemoryStorage::new();
    let store = RowStore::new(mem.clone());
    write_report(&store, "report.rpk");
    let container = store.container("report.rpk");
    let sealed_len = mem.len_of("report.rpk").unwrap();

    for round in 0..5 {
        let mut ed = container.edit_metadata().unwrap();
        ed.meta_mut()
            .source
            .extra
            .insert("round".into(), json!(round));
        ed.commit().unwrap();
        let r = container.reader().unwrap();
        assert_eq!(r.meta().source.extra["round"], json!(round));
        assert!(mem.len_of("report.rpk").unwrap() <= sealed_len + r.file_header().metadata_len);
    }
}
