// End-to-end store flows through the public API.
use obtstore::api::{
    CachingIndex, Column, ColumnData, ErrorKind, Frame, FrameKey, FrameTable, OneBigTable,
    OpenMode, Predicate, SchemaOptions, StoreOptions, StoreState, TimeUnit, compact,
};
use time::{Duration, OffsetDateTime};

fn start() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(946_684_800).expect("epoch")
}

fn prices(rows: usize, base: f64) -> Frame {
    let ts = (0..rows).map(|i| start() + Duration::minutes(i as i64)).collect();
    Frame::new(
        Column::new("timestamp", ColumnData::Datetime(ts)),
        vec![
            Column::new("close", ColumnData::Float64((0..rows).map(|i| base + i as f64).collect())),
            Column::new("volume", ColumnData::Int64((0..rows).map(|i| 1_000 + i as i64).collect())),
            Column::new("halted", ColumnData::Bool((0..rows).map(|i| i % 10 == 0).collect())),
        ],
    )
    .expect("frame")
}

#[test]
fn two_symbols_survive_reindexing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("prices");
    let aapl = prices(100, 100.0);
    let msft = prices(50, 300.0);

    let mut store = OneBigTable::open(&root, OpenMode::Write, StoreOptions::default()).expect("open");
    assert_eq!(store.set("AAPL", &aapl).expect("set AAPL"), 100);
    assert_eq!(store.set("MSFT", &msft).expect("set MSFT"), 50);

    let keys: Vec<FrameKey> = store.keys().expect("keys").into_iter().collect();
    assert_eq!(keys, vec![FrameKey::from("AAPL"), FrameKey::from("MSFT")]);
    assert_eq!(store.get("AAPL").expect("get"), aapl);
    assert_eq!(store.get("MSFT").expect("get"), msft);

    store.sort_index().expect("sort_index");
    assert_eq!(store.state(), StoreState::Reindexed);
    assert_eq!(store.get("AAPL").expect("get"), aapl);
    assert_eq!(store.get("MSFT").expect("get"), msft);
    store.close().expect("close");

    let reader = OneBigTable::open(&root, OpenMode::Read, StoreOptions::default()).expect("reopen");
    assert_eq!(reader.nrows(), 150);
    assert_eq!(reader.get("MSFT").expect("get"), msft);
    assert_eq!(reader.get("GOOG").unwrap_err().kind(), ErrorKind::NoSuchKey);
}

#[test]
fn datetime_literals_hit_exactly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut store =
        OneBigTable::open(temp.path().join("s"), OpenMode::Write, StoreOptions::default()).expect("open");
    store.set("AAPL", &prices(20, 1.0)).expect("set");

    let target = start() + Duration::minutes(7);
    let q = store.query().expect("query");
    let ts = q.col("timestamp").expect("col");
    let before = store.select(&ts.eq(target - Duration::nanoseconds(1)).expect("pred")).expect("select");
    let at = store.select(&ts.eq(target).expect("pred")).expect("select");
    let after = store.select(&ts.eq(target + Duration::nanoseconds(1)).expect("pred")).expect("select");
    assert!(before.is_empty());
    assert_eq!(at.len(), 1);
    assert_eq!(at.column("close").expect("close").data, ColumnData::Float64(vec![8.0]));
    assert!(after.is_empty());

    let window = store
        .select(&(ts.ge(target).expect("ge") & ts.lt(target + Duration::minutes(3)).expect("lt")))
        .expect("select");
    assert_eq!(window.len(), 3);
}

#[test]
fn second_resolution_literals_between_ticks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let options = StoreOptions::default()
        .with_schema(SchemaOptions::default().with_datetime_unit(TimeUnit::Second));
    let mut store = OneBigTable::open(temp.path().join("s"), OpenMode::Write, options).expect("open");
    store.set("AAPL", &prices(20, 1.0)).expect("set");

    let t0 = start() + Duration::minutes(7);
    let half = t0 + Duration::milliseconds(500);
    let q = store.query().expect("query");
    let ts = q.col("timestamp").expect("col");
    let count = |pred: Predicate| store.select(&pred).expect("select").len();
    assert_eq!(count(ts.eq(t0).expect("eq")), 1);
    assert_eq!(count(ts.eq(half).expect("eq")), 0);
    assert_eq!(count(ts.eq(t0 - Duration::milliseconds(500)).expect("eq")), 0);
    assert_eq!(count(ts.ne(half).expect("ne")), 20);
    assert_eq!(count(ts.lt(half).expect("lt")), 8);
    assert_eq!(count(ts.le(half).expect("le")), 8);
    assert_eq!(count(ts.gt(half).expect("gt")), 12);
    assert_eq!(count(ts.ge(half).expect("ge")), 12);
    assert_eq!(count(ts.ge(t0 - Duration::milliseconds(500)).expect("ge")), 13);
}

#[test]
fn float_predicates_compare_like_ieee() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut store =
        OneBigTable::open(temp.path().join("s"), OpenMode::Write, StoreOptions::default()).expect("open");
    let frame = Frame::new(
        Column::new("i", ColumnData::Int64(vec![0, 1, 2])),
        vec![Column::new("v", ColumnData::Float64(vec![-0.0, 0.0, f64::NAN]))],
    )
    .expect("frame");
    store.set("a", &frame).expect("set");

    let q = store.query().expect("query");
    let v = q.col("v").expect("col");
    assert_eq!(store.select(&v.eq(0.0).expect("eq")).expect("select").len(), 2);
    assert!(store.select(&v.gt(3.0).expect("gt")).expect("select").is_empty());
    assert_eq!(store.select(&v.le(3.0).expect("le")).expect("select").len(), 2);
    assert_eq!(store.select(&v.ne(0.0).expect("ne")).expect("select").len(), 1);
}

#[test]
fn keys_are_isolated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut store =
        OneBigTable::open(temp.path().join("s"), OpenMode::Write, StoreOptions::default()).expect("open");
    let a = prices(5, 0.0);
    let b = prices(3, 50.0);
    store.set("A", &a).expect("set");
    let before = store.get("A").expect("get");
    store.set("B", &b).expect("set");
    store.set("B", &b).expect("set again");
    assert_eq!(store.get("A").expect("get"), before);
    assert_eq!(store.get("B").expect("get"), Frame::concat(&[b.clone(), b]).expect("concat"));
}

#[test]
fn schema_stays_fixed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut store =
        OneBigTable::open(temp.path().join("s"), OpenMode::Write, StoreOptions::default()).expect("open");
    store.set("A", &prices(5, 0.0)).expect("set");
    let schema = store.schema().expect("schema").clone();

    let fewer = prices(2, 0.0).without_column("halted");
    assert_eq!(store.set("A", &fewer).unwrap_err().kind(), ErrorKind::SchemaMismatch);
    let extra = prices(2, 0.0)
        .with_column(Column::new("note", ColumnData::Str(vec!["x".into(), "y".into()])))
        .expect("extra");
    assert_eq!(store.set("A", &extra).unwrap_err().kind(), ErrorKind::SchemaMismatch);
    assert_eq!(store.schema().expect("schema"), &schema);
    assert_eq!(store.nrows(), 5);
}

#[test]
fn cached_index_drives_range_reads() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("s");
    {
        let mut store = OneBigTable::open(&root, OpenMode::Write, StoreOptions::default()).expect("open");
        store.set("A", &prices(30, 0.0)).expect("set");
    }
    let table = FrameTable::open_read_only(root.join("obt.tbl")).expect("table");
    let mut index = CachingIndex::new();
    let rows = index
        .between(&table, start() + Duration::minutes(10), start() + Duration::minutes(14))
        .expect("between");
    assert_eq!(rows, 10..15);
    let frame = table.read_ranges(&[rows]).expect("read");
    assert_eq!(frame.len(), 5);

    let halted = table.read_where(r#".["halted"] == true"#).expect("scan");
    assert_eq!(halted.len(), 3);
    assert_eq!(compact(&[0, 10, 11, 20]), vec![0..1, 10..12, 20..21]);
}
