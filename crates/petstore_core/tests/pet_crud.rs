use petstore_core::model::schema::{
    COLUMN_BREED, COLUMN_GENDER, COLUMN_ID, COLUMN_NAME, COLUMN_WEIGHT,
};
use petstore_core::{
    ChangeEvent, ChangeOperation, FieldValue, Filter, Gender, Pet, Record, SortOrder,
    StorageEngine, StoreConfig, StoreError, ValidationError,
};
use std::sync::{Arc, Mutex};

const PETS_URI: &str = "content://com.example.android.pets/pets";

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory().unwrap()
}

fn toto() -> Record {
    Record::new()
        .with(COLUMN_NAME, "Toto")
        .with(COLUMN_BREED, "Terrier")
        .with(COLUMN_GENDER, 1)
        .with(COLUMN_WEIGHT, 7)
}

fn item_uri(id: i64) -> String {
    format!("{PETS_URI}/{id}")
}

fn query_all(engine: &StorageEngine) -> Vec<Record> {
    engine
        .query(PETS_URI, &[], &Filter::default(), &SortOrder::default())
        .unwrap()
}

fn query_one(engine: &StorageEngine, id: i64) -> Option<Record> {
    engine
        .query(&item_uri(id), &[], &Filter::default(), &SortOrder::default())
        .unwrap()
        .into_iter()
        .next()
}

#[test]
fn insert_toto_then_query_collection_returns_it() {
    let engine = engine();

    let id = engine.insert(PETS_URI, &toto()).unwrap();
    let rows = query_all(&engine);

    assert_eq!(rows.len(), 1);
    let expected = Record::new()
        .with(COLUMN_ID, id)
        .with(COLUMN_NAME, "Toto")
        .with(COLUMN_BREED, "Terrier")
        .with(COLUMN_GENDER, 1)
        .with(COLUMN_WEIGHT, 7);
    assert_eq!(rows[0], expected);
}

#[test]
fn insert_then_query_by_id_roundtrips_every_field() {
    let engine = engine();
    let pets = [
        Pet {
            id: None,
            name: "Binx".to_string(),
            breed: "Bombay".to_string(),
            gender: Gender::Female,
            weight: 4,
        },
        Pet {
            id: None,
            name: "Tommy".to_string(),
            breed: "Persian".to_string(),
            gender: Gender::Unknown,
            weight: 0,
        },
        Pet::new("Lady"),
    ];

    for pet in pets {
        let id = engine.insert(PETS_URI, &pet.to_record()).unwrap();
        let loaded = Pet::try_from(&query_one(&engine, id).unwrap()).unwrap();
        assert_eq!(loaded, Pet { id: Some(id), ..pet });
    }
}

#[test]
fn insert_applies_breed_and_weight_defaults() {
    let engine = engine();
    let id = engine
        .insert(
            PETS_URI,
            &Record::new().with(COLUMN_NAME, "Rex").with(COLUMN_GENDER, 0),
        )
        .unwrap();

    let row = query_one(&engine, id).unwrap();
    assert_eq!(row.get_str(COLUMN_BREED), Some("Unknown"));
    assert_eq!(row.get_i64(COLUMN_WEIGHT), Some(0));
}

#[test]
fn ids_are_unique_and_increasing() {
    let engine = engine();
    let first = engine.insert(PETS_URI, &toto()).unwrap();
    let second = engine.insert(PETS_URI, &toto()).unwrap();
    assert!(second > first);
}

#[test]
fn insert_with_invalid_gender_is_rejected_and_writes_nothing() {
    let engine = engine();
    for gender in [3, -1, 42] {
        let err = engine
            .insert(PETS_URI, &toto().with(COLUMN_GENDER, gender))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidGender(value)) if value == gender
        ));
    }
    assert!(query_all(&engine).is_empty());
}

#[test]
fn insert_without_name_is_rejected() {
    let engine = engine();

    let mut missing = toto();
    missing.remove(COLUMN_NAME);
    assert!(matches!(
        engine.insert(PETS_URI, &missing).unwrap_err(),
        StoreError::Validation(ValidationError::MissingRequired(COLUMN_NAME))
    ));

    assert!(matches!(
        engine
            .insert(PETS_URI, &toto().with(COLUMN_NAME, "   "))
            .unwrap_err(),
        StoreError::Validation(ValidationError::EmptyValue(COLUMN_NAME))
    ));
    assert!(query_all(&engine).is_empty());
}

#[test]
fn insert_rejects_negative_weight_text_weight_and_unknown_columns() {
    let engine = engine();

    assert!(matches!(
        engine
            .insert(PETS_URI, &toto().with(COLUMN_WEIGHT, -2))
            .unwrap_err(),
        StoreError::Validation(ValidationError::NegativeValue { .. })
    ));
    assert!(matches!(
        engine
            .insert(PETS_URI, &toto().with(COLUMN_WEIGHT, "heavy"))
            .unwrap_err(),
        StoreError::Validation(ValidationError::TypeMismatch { .. })
    ));
    assert!(matches!(
        engine
            .insert(PETS_URI, &toto().with("owner", "Dorothy"))
            .unwrap_err(),
        StoreError::Validation(ValidationError::UnknownColumn(_))
    ));
    assert!(query_all(&engine).is_empty());
}

#[test]
fn insert_on_item_uri_is_unsupported() {
    let engine = engine();
    let err = engine.insert(&item_uri(1), &toto()).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedOperation(_)));
}

#[test]
fn unknown_uris_are_rejected_before_storage() {
    let engine = engine();
    let staff = "content://com.example.android.pets/staff";

    assert!(matches!(
        engine.insert(staff, &toto()).unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        engine
            .query(staff, &[], &Filter::default(), &SortOrder::default())
            .unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        engine.delete(staff, &Filter::default()).unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn update_weight_changes_only_weight() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();

    let changed = engine
        .update(
            &item_uri(id),
            &Record::new().with(COLUMN_WEIGHT, 9),
            &Filter::default(),
        )
        .unwrap();
    assert_eq!(changed, 1);

    let row = query_one(&engine, id).unwrap();
    assert_eq!(row.get_i64(COLUMN_WEIGHT), Some(9));
    assert_eq!(row.get_str(COLUMN_NAME), Some("Toto"));
    assert_eq!(row.get_str(COLUMN_BREED), Some("Terrier"));
    assert_eq!(row.get_i64(COLUMN_GENDER), Some(1));
    assert_eq!(row.get_i64(COLUMN_ID), Some(id));
}

#[test]
fn update_of_absent_id_affects_zero_rows() {
    let engine = engine();
    engine.insert(PETS_URI, &toto()).unwrap();

    let changed = engine
        .update(
            &item_uri(9999),
            &Record::new().with(COLUMN_WEIGHT, 9),
            &Filter::default(),
        )
        .unwrap();
    assert_eq!(changed, 0);
}

#[test]
fn repeated_identical_update_reports_one_row_and_keeps_id() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();

    for _ in 0..3 {
        let changed = engine
            .update(&item_uri(id), &toto(), &Filter::default())
            .unwrap();
        assert_eq!(changed, 1);
    }

    let rows = query_all(&engine);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i64(COLUMN_ID), Some(id));
}

#[test]
fn update_with_invalid_gender_is_rejected_and_row_unchanged() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();

    let err = engine
        .update(
            &item_uri(id),
            &Record::new().with(COLUMN_GENDER, 7).with(COLUMN_WEIGHT, 1),
            &Filter::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::InvalidGender(7))
    ));

    let err = engine
        .update(
            PETS_URI,
            &Record::new().with(COLUMN_GENDER, 7),
            &Filter::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let row = query_one(&engine, id).unwrap();
    assert_eq!(row.get_i64(COLUMN_GENDER), Some(1));
    assert_eq!(row.get_i64(COLUMN_WEIGHT), Some(7));
}

#[test]
fn update_cannot_write_id_or_blank_name() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();

    assert!(matches!(
        engine
            .update(
                &item_uri(id),
                &Record::new().with(COLUMN_ID, 500),
                &Filter::default()
            )
            .unwrap_err(),
        StoreError::Validation(ValidationError::ImmutableColumn(COLUMN_ID))
    ));
    assert!(matches!(
        engine
            .update(
                &item_uri(id),
                &Record::new().with(COLUMN_NAME, ""),
                &Filter::default()
            )
            .unwrap_err(),
        StoreError::Validation(ValidationError::EmptyValue(COLUMN_NAME))
    ));
}

#[test]
fn empty_update_affects_nothing() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();
    let changed = engine
        .update(&item_uri(id), &Record::new(), &Filter::default())
        .unwrap();
    assert_eq!(changed, 0);
}

#[test]
fn collection_update_applies_to_filtered_rows() {
    let engine = engine();
    engine.insert(PETS_URI, &toto()).unwrap();
    engine
        .insert(PETS_URI, &toto().with(COLUMN_NAME, "Binx").with(COLUMN_GENDER, 2))
        .unwrap();
    engine
        .insert(PETS_URI, &toto().with(COLUMN_NAME, "Rex"))
        .unwrap();

    let changed = engine
        .update(
            PETS_URI,
            &Record::new().with(COLUMN_BREED, "Mixed"),
            &Filter::new().eq(COLUMN_GENDER, 1),
        )
        .unwrap();
    assert_eq!(changed, 2);

    let mixed = engine
        .query(
            PETS_URI,
            &[COLUMN_NAME.to_string()],
            &Filter::new().eq(COLUMN_BREED, "Mixed"),
            &SortOrder::new().asc(COLUMN_NAME),
        )
        .unwrap();
    let names = mixed
        .iter()
        .map(|row| row.get_str(COLUMN_NAME).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Rex", "Toto"]);
}

#[test]
fn delete_collection_without_filter_removes_everything() {
    let engine = engine();
    engine.insert(PETS_URI, &toto()).unwrap();
    engine.insert(PETS_URI, &toto()).unwrap();

    let removed = engine.delete(PETS_URI, &Filter::default()).unwrap();
    assert_eq!(removed, 2);
    assert!(query_all(&engine).is_empty());

    assert_eq!(engine.delete(PETS_URI, &Filter::default()).unwrap(), 0);
}

#[test]
fn delete_item_removes_only_that_row() {
    let engine = engine();
    let first = engine.insert(PETS_URI, &toto()).unwrap();
    let second = engine.insert(PETS_URI, &toto()).unwrap();

    assert_eq!(engine.delete(&item_uri(first), &Filter::default()).unwrap(), 1);
    assert_eq!(engine.delete(&item_uri(first), &Filter::default()).unwrap(), 0);

    let rows = query_all(&engine);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i64(COLUMN_ID), Some(second));
}

#[test]
fn query_projection_filter_and_sort() {
    let engine = engine();
    for (name, weight) in [("Toto", 7), ("Binx", 4), ("Rex", 12), ("Lady", 5)] {
        engine
            .insert(
                PETS_URI,
                &toto().with(COLUMN_NAME, name).with(COLUMN_WEIGHT, weight),
            )
            .unwrap();
    }

    let rows = engine
        .query(
            PETS_URI,
            &[COLUMN_WEIGHT.to_string(), COLUMN_NAME.to_string()],
            &Filter::new().ge(COLUMN_WEIGHT, 5).lt(COLUMN_WEIGHT, 12),
            &SortOrder::new().desc(COLUMN_WEIGHT),
        )
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].column_names(), vec![COLUMN_WEIGHT, COLUMN_NAME]);
    assert_eq!(rows[0].get_str(COLUMN_NAME), Some("Toto"));
    assert_eq!(rows[1].get_str(COLUMN_NAME), Some("Lady"));
}

#[test]
fn query_without_matches_is_empty_but_bad_columns_fail() {
    let engine = engine();

    assert!(query_all(&engine).is_empty());
    assert!(query_one(&engine, 12).is_none());

    let err = engine
        .query(
            PETS_URI,
            &["owner".to_string()],
            &Filter::default(),
            &SortOrder::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::UnknownColumn(_))
    ));

    let err = engine
        .query(
            PETS_URI,
            &[],
            &Filter::new().eq(COLUMN_WEIGHT, "seven"),
            &SortOrder::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::TypeMismatch { .. })
    ));

    let err = engine
        .query(
            PETS_URI,
            &[],
            &Filter::default(),
            &SortOrder::new().asc("age"),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn writes_publish_change_events() {
    let engine = engine();
    let events = Arc::new(Mutex::new(Vec::<ChangeEvent>::new()));
    let sink = Arc::clone(&events);
    engine.notifier().subscribe(
        engine.collection_uri(),
        Arc::new(move |event: &ChangeEvent| sink.lock().unwrap().push(event.clone())),
    );

    let id = engine.insert(PETS_URI, &toto()).unwrap();
    engine
        .update(
            &item_uri(id),
            &Record::new().with(COLUMN_WEIGHT, 8),
            &Filter::default(),
        )
        .unwrap();
    engine
        .update(
            &item_uri(id + 100),
            &Record::new().with(COLUMN_WEIGHT, 8),
            &Filter::default(),
        )
        .unwrap();
    engine.delete(&item_uri(id), &Filter::default()).unwrap();
    engine.delete(PETS_URI, &Filter::default()).unwrap();

    let events = events.lock().unwrap();
    let summary = events
        .iter()
        .map(|event| (event.operation, event.uri.to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (ChangeOperation::Insert, item_uri(id)),
            (ChangeOperation::Update, item_uri(id)),
            (ChangeOperation::Delete, PETS_URI.to_string()),
        ]
    );
}

#[test]
fn failed_write_publishes_nothing() {
    let engine = engine();
    let events = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&events);
    engine.notifier().subscribe(
        engine.collection_uri(),
        Arc::new(move |_: &ChangeEvent| *sink.lock().unwrap() += 1),
    );

    engine
        .insert(PETS_URI, &toto().with(COLUMN_GENDER, 9))
        .unwrap_err();
    assert_eq!(*events.lock().unwrap(), 0);
}

#[test]
fn get_type_reports_list_and_item_mime_types() {
    let engine = engine();
    assert_eq!(
        engine.get_type(PETS_URI).unwrap(),
        "vnd.cursor.dir/com.example.android.pets/pets"
    );
    assert_eq!(
        engine.get_type(&item_uri(3)).unwrap(),
        "vnd.cursor.item/com.example.android.pets/pets"
    );
}

#[test]
fn file_backed_engine_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("shelter.db"));

    let id = {
        let engine = StorageEngine::open(&config).unwrap();
        engine.insert(PETS_URI, &toto()).unwrap()
    };

    let engine = StorageEngine::open(&config).unwrap();
    let row = query_one(&engine, id).unwrap();
    assert_eq!(row.get("name"), Some(&FieldValue::from("Toto")));
}

#[test]
fn records_serialize_as_column_maps() {
    let engine = engine();
    let id = engine.insert(PETS_URI, &toto()).unwrap();
    let row = query_one(&engine, id).unwrap();

    let json = serde_json::to_value(&row).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": id,
            "name": "Toto",
            "breed": "Terrier",
            "gender": 1,
            "weight": 7
        })
    );
}
