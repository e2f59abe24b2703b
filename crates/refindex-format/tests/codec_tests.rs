mod common;

use chunk_archive::AttrValue;
use refindex_format::{
    build_file_index, merge, read_bundle, write_bundle, BuildOptions, CombinedIndex, Dataset,
    FileIndex, IndexBundleReader, IndexBundleWriter, IndexError, MergeOptions, VirtualReader,
};
use std::io::Cursor;

use common::{synthetic_dataset, synthetic_index, timestep_archive};

/// Index whose global and `v` attributes hold non-finite floats.
fn non_finite_index() -> FileIndex {
    let mut ds = synthetic_dataset("a.cha", 2, 0);
    ds.attributes
        .insert("missing_value".to_string(), AttrValue::Float(f64::NAN));
    ds.variables.get_mut("v").unwrap().meta.attributes.insert(
        "valid_range".to_string(),
        AttrValue::FloatList(vec![f64::NEG_INFINITY, 1.5, f64::INFINITY, f64::NAN]),
    );
    FileIndex::new("a.cha", ds).unwrap()
}

fn assert_non_finite_attributes(ds: &Dataset) {
    match ds.attributes.get("missing_value") {
        Some(AttrValue::Float(v)) => assert!(v.is_nan()),
        other => panic!("expected NaN attribute, got {other:?}"),
    }
    match ds.variable("v").unwrap().meta.attributes.get("valid_range") {
        Some(AttrValue::FloatList(v)) => {
            assert_eq!(v.len(), 4);
            assert_eq!(v[0], f64::NEG_INFINITY);
            assert_eq!(v[1], 1.5);
            assert_eq!(v[2], f64::INFINITY);
            assert!(v[3].is_nan());
        }
        other => panic!("expected float list, got {other:?}"),
    }
}

/// Merged index holding both inline and range references.
fn mixed_index() -> CombinedIndex {
    let opts = BuildOptions {
        inline_threshold: 16,
    };
    let inputs = vec![
        build_file_index("data/a.cha", &timestep_archive(0.0, 2), &opts).unwrap(),
        build_file_index("data/b.cha", &timestep_archive(2.0, 3), &opts).unwrap(),
    ];
    merge(inputs, &MergeOptions::new("t")).unwrap()
}

fn assert_resolves_identically(a: &CombinedIndex, b: &CombinedIndex) {
    let (ra, rb) = (VirtualReader::new(a), VirtualReader::new(b));
    for (name, var) in &a.dataset().variables {
        for key in var.chunks.keys() {
            assert_eq!(
                ra.resolve(name, key.coord()),
                rb.resolve(name, key.coord()),
                "{name} {key}"
            );
        }
    }
}

#[test]
fn json_document_round_trips_losslessly() {
    let index = mixed_index();
    let v = index.dataset().variable("t").unwrap();
    assert!(v.inline_count() > 0);
    let x = index.dataset().variable("x").unwrap();
    assert_eq!(x.inline_count(), 0);

    let text = index.to_json().unwrap();
    let back = CombinedIndex::from_json(&text).unwrap();

    assert_eq!(back, index);
    assert_resolves_identically(&index, &back);
}

#[test]
fn json_document_uses_dotted_keys_and_range_triples() {
    let combined = CombinedIndex::from(synthetic_index("a.cha", 2, 0));
    let value: serde_json::Value = serde_json::from_str(&combined.to_json().unwrap()).unwrap();

    assert_eq!(value["version"], 1);
    assert_eq!(
        value["dataset"]["variables"]["v"]["chunks"]["1"],
        serde_json::json!(["a.cha", 20, 4])
    );
    assert_eq!(value["dataset"]["dimensions"]["t"], 2);
    assert_eq!(value["provenance"]["sources"][0], "a.cha");
}

#[test]
fn json_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("combined.json");
    let index = mixed_index();

    index.write_json(&path).unwrap();
    let back = CombinedIndex::read_json(&path).unwrap();
    assert_eq!(back, index);
}

#[test]
fn non_finite_float_attributes_survive_json() {
    let index = CombinedIndex::from(non_finite_index());
    let text = index.to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value["dataset"]["attributes"]["missing_value"],
        serde_json::json!({ "float": "NaN" })
    );
    assert_eq!(
        value["dataset"]["variables"]["v"]["meta"]["attributes"]["valid_range"],
        serde_json::json!({ "float_list": ["-Infinity", 1.5, "Infinity", "NaN"] })
    );

    let back = CombinedIndex::from_json(&text).unwrap();
    assert_non_finite_attributes(back.dataset());
    assert_eq!(back.dataset().dimensions, index.dataset().dimensions);
    assert_eq!(back.dataset().variable("x"), index.dataset().variable("x"));
    assert_eq!(
        back.dataset().variable("v").unwrap().chunks,
        index.dataset().variable("v").unwrap().chunks
    );
}

#[test]
fn non_finite_float_attributes_survive_bundles() {
    let mut w = IndexBundleWriter::new(Vec::new());
    w.write(&non_finite_index()).unwrap();
    let mut r = IndexBundleReader::new(Cursor::new(w.into_inner()));

    let back = r.read().unwrap().unwrap();
    assert_non_finite_attributes(back.dataset());
}

#[test]
fn unknown_non_finite_spelling_is_a_json_error() {
    let combined = CombinedIndex::from(synthetic_index("a.cha", 1, 0));
    let mut value: serde_json::Value =
        serde_json::from_str(&combined.to_json().unwrap()).unwrap();
    value["dataset"]["attributes"]["scale"] = serde_json::json!({ "float": "nan" });

    assert!(matches!(
        CombinedIndex::from_json(&value.to_string()),
        Err(IndexError::Json(_))
    ));
}

#[test]
fn unknown_document_version_is_rejected() {
    let combined = CombinedIndex::from(synthetic_index("a.cha", 1, 0));
    let mut value: serde_json::Value =
        serde_json::from_str(&combined.to_json().unwrap()).unwrap();
    value["version"] = serde_json::json!(7);

    assert!(matches!(
        CombinedIndex::from_json(&value.to_string()),
        Err(IndexError::UnsupportedVersion(7))
    ));
}

#[test]
fn document_violating_invariants_is_rejected() {
    let combined = CombinedIndex::from(synthetic_index("a.cha", 2, 0));
    let mut value: serde_json::Value =
        serde_json::from_str(&combined.to_json().unwrap()).unwrap();
    value["dataset"]["variables"]["v"]["chunks"]["9"] = serde_json::json!(["a.cha", 0, 4]);

    assert!(matches!(
        CombinedIndex::from_json(&value.to_string()),
        Err(IndexError::Invalid { .. })
    ));
}

#[test]
fn malformed_inline_payload_is_a_json_error() {
    let combined = CombinedIndex::from(synthetic_index("a.cha", 1, 0));
    let mut value: serde_json::Value =
        serde_json::from_str(&combined.to_json().unwrap()).unwrap();
    value["dataset"]["variables"]["v"]["chunks"]["0"] = serde_json::json!("base64:@@@");

    assert!(matches!(
        CombinedIndex::from_json(&value.to_string()),
        Err(IndexError::Json(_))
    ));
}

#[test]
fn bundle_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexes.bundle");
    let opts = BuildOptions {
        inline_threshold: 16,
    };
    let files: Vec<FileIndex> = (0..3)
        .map(|i| {
            build_file_index(
                &format!("f{i}.cha"),
                &timestep_archive(i as f64, 1),
                &opts,
            )
            .unwrap()
        })
        .collect();

    assert_eq!(write_bundle(&path, &files).unwrap(), 3);
    assert_eq!(read_bundle(&path).unwrap(), files);
}

#[test]
fn bundle_cut_inside_a_frame_is_an_error() {
    let mut w = IndexBundleWriter::new(Vec::new());
    w.write(&synthetic_index("a", 2, 0)).unwrap();
    w.write(&synthetic_index("b", 2, 1)).unwrap();
    let mut bytes = w.into_inner();
    bytes.truncate(bytes.len() - 3);

    let mut r = IndexBundleReader::new(Cursor::new(bytes));
    assert_eq!(r.read().unwrap().unwrap().source(), "a");
    assert!(r.read().is_err());
}

#[test]
fn empty_bundle_has_no_indexes() {
    let mut r = IndexBundleReader::new(Cursor::new(Vec::new()));
    assert!(r.read().unwrap().is_none());
}
