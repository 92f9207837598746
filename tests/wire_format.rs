use mkts::codec;
use mkts::request::{build_query, build_write, WritePayload};
use mkts::{Column, ColumnData, Error, QuerySpec, Table, Value, EPOCH_COLUMN};
use serde_json::{json, Value as Json};
use time::OffsetDateTime;

/// Decodes msgpack bytes into a JSON value so map keys can be inspected.
fn msgpack_view<T: serde::Serialize>(value: &T) -> Json {
    let bytes = rmp_serde::to_vec_named(value).expect("encode");
    rmp_serde::from_slice(&bytes).expect("decode")
}

#[test]
fn query_round_trip_scenario() {
    let spec = QuerySpec::new("TSLA", "1Min", "OHLCV")
        .expect("spec")
        .with_range(1_500_000_000_i64, 4_294_967_296_i64)
        .expect("range");
    let request = build_query(spec);
    assert_eq!(
        msgpack_view(&request.requests[0]),
        json!({
            "destination": "TSLA/1Min/OHLCV",
            "epoch_start": 1_500_000_000_i64,
            "epoch_end": 4_294_967_296_i64,
        })
    );
}

#[test]
fn absent_fields_stay_absent() {
    let spec = QuerySpec::new("TSLA", "1Min", "OHLCV")
        .expect("spec")
        .with_columns(["Close"]);
    let view = msgpack_view(&build_query(spec).requests[0]);
    let map = view.as_object().expect("map");
    assert_eq!(map.len(), 1);
    assert!(!map.contains_key("limit_record_count"));
    assert!(!map.contains_key("columns"));

    let spec = QuerySpec::new("TSLA", "1Min", "OHLCV")
        .expect("spec")
        .with_limit(10)
        .with_limit_from_start(false)
        .with_functions(["Gap('1Min')"]);
    let view = msgpack_view(&build_query(spec).requests[0]);
    assert_eq!(view["limit_record_count"], json!(10));
    assert_eq!(view["limit_from_start"], json!(false));
    assert_eq!(view["functions"], json!(["Gap('1Min')"]));
}

#[test]
fn batch_query_keeps_request_order() {
    let specs = vec![
        QuerySpec::new("AAPL", "1Min", "OHLCV").expect("spec"),
        QuerySpec::new("MSFT", "1D", "OHLCV").expect("spec"),
    ];
    let request = build_query(specs);
    let destinations: Vec<&str> = request
        .requests
        .iter()
        .map(|r| r.destination.as_str())
        .collect();
    assert_eq!(destinations, vec!["AAPL/1Min/OHLCV", "MSFT/1D/OHLCV"]);
}

#[test]
fn codec_round_trip_all_types() {
    let table = Table::new(vec![
        Column::new(EPOCH_COLUMN, vec![i64::MIN, 0, i64::MAX]),
        Column::new("I", vec![i32::MIN, -1, i32::MAX]),
        Column::new("F", vec![f32::MIN_POSITIVE, -0.5, f32::MAX]),
        Column::new("D", vec![f64::EPSILON, 1e300, -2.25]),
    ])
    .expect("table");
    let set = codec::encode(&table).expect("encode");
    assert_eq!(set.types, vec!["i8", "i4", "f4", "f8"]);
    assert_eq!(codec::decode_set(&set).expect("decode"), table);
}

#[test]
fn write_truncates_sub_second_index() {
    let at = OffsetDateTime::from_unix_timestamp_nanos(1_500_000_000_999_999_999).expect("ts");
    let payload = WritePayload::row(at, [("Bid", Value::F32(1.25)), ("Ask", Value::F32(1.5))]);
    let request = build_write(&payload, "TSLA/1Min/OHLCV", false).expect("write");

    let dataset = &request.requests[0].dataset;
    assert_eq!(dataset.names, vec!["Epoch", "Bid", "Ask"]);
    assert_eq!(dataset.types, vec!["i8", "f4", "f4"]);
    assert_eq!(dataset.length, 1);
    assert_eq!(dataset.startindex.get("TSLA/1Min/OHLCV"), Some(0));
    assert_eq!(dataset.lengths.get("TSLA/1Min/OHLCV"), Some(1));
    assert_eq!(&dataset.data[0][..], &1_500_000_000_i64.to_le_bytes());

    // The query path keeps the nanoseconds the write path drops.
    let spec = QuerySpec::new("TSLA", "1Min", "OHLCV")
        .expect("spec")
        .with_start(at)
        .expect("start");
    let query = build_query(spec);
    assert_eq!(query.requests[0].epoch_start, Some(1_500_000_000));
    assert_eq!(query.requests[0].epoch_start_nanos, Some(999_999_999));
}

#[test]
fn write_shapes_normalize_to_epoch_first() {
    let index: Vec<OffsetDateTime> = [60_i64, 120]
        .iter()
        .map(|s| OffsetDateTime::from_unix_timestamp(*s).expect("ts"))
        .collect();

    let series = WritePayload::series("Close", index.clone(), vec![1.0_f64, 2.0]);
    let frame = WritePayload::Frame {
        index: index.clone(),
        columns: vec!["Close".to_string()],
        rows: vec![vec![Value::F64(1.0)], vec![Value::F64(2.0)]],
    };
    assert_eq!(
        series.to_table().expect("series"),
        frame.to_table().expect("frame")
    );

    let records = WritePayload::Records(
        Table::new(vec![
            Column::new(EPOCH_COLUMN, vec![60_i64, 120]),
            Column::new("Close", ColumnData::from(vec![1.0_f64, 2.0])),
        ])
        .expect("table"),
    );
    assert_eq!(
        records.to_table().expect("records"),
        series.to_table().expect("series")
    );

    let ragged = WritePayload::Frame {
        index,
        columns: vec!["Open".to_string(), "Close".to_string()],
        rows: vec![
            vec![Value::F64(1.0), Value::F64(1.5)],
            vec![Value::F64(2.0)],
        ],
    };
    assert!(matches!(ragged.to_table(), Err(Error::Payload(_))));
}
