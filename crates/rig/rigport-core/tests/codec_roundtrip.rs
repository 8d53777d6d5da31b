use std::collections::BTreeMap;

use data_encoding::BASE32;
use rigport_core::{
    decode_export, decode_import_meta, encode_export, AnimationPayload, CFrame, PoseFrame,
    RigError,
};

/// Split a payload the way the platform-side exporter does: base32, `'='`
/// padding replaced by `'0'`, spread across `Meta<i>q1<chunk>q1` object names.
fn carrier_names(json: &str, chunk_len: usize) -> Vec<String> {
    let encoded = BASE32.encode(json.as_bytes()).replace('=', "0");
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(chunk_len).collect();
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Meta{}q1{}q1", i + 1, std::str::from_utf8(c).unwrap()))
        .collect()
}

#[test]
fn carrier_chunks_reassemble_in_index_order() {
    let json = rigport_test_fixtures::rigs::json("r6").unwrap();
    let mut names = carrier_names(&json, 40);
    assert!(names.len() > 3);
    // Scene order is arbitrary; throw in unrelated objects too.
    names.reverse();
    names.push("Camera".into());
    names.push("Dummy11".into());

    let meta = decode_import_meta(names.iter().map(String::as_str)).unwrap();
    assert_eq!(meta.rig_name, "Dummy");
    assert_eq!(meta.rig.node_count(), 7);
    assert_eq!(meta.parts.len(), 6);
}

#[test]
fn lowercase_carriers_decode() {
    let json = rigport_test_fixtures::rigs::json("r6").unwrap();
    let names: Vec<String> = carrier_names(&json, 64)
        .iter()
        .map(|n| n.to_ascii_lowercase().replacen("meta", "Meta", 1))
        .collect();
    let meta = decode_import_meta(names.iter().map(String::as_str)).unwrap();
    assert_eq!(meta.rig_name, "Dummy");
}

#[test]
fn missing_chunk_is_reported_by_index() {
    let json = rigport_test_fixtures::rigs::json("r6").unwrap();
    let names: Vec<String> = carrier_names(&json, 40)
        .into_iter()
        .filter(|n| !n.starts_with("Meta2q1"))
        .collect();
    let err = decode_import_meta(names.iter().map(String::as_str)).unwrap_err();
    assert_eq!(err, RigError::MissingMetaChunk { index: 2 });
}

#[test]
fn no_carriers_means_no_metadata() {
    let names = ["Camera", "Cube", "Light"];
    let err = decode_import_meta(names).unwrap_err();
    assert_eq!(err, RigError::MetaPattern);
}

#[test]
fn garbled_carrier_fails_decode() {
    let names = ["Meta1q1!!!not-base32!!!q1"];
    let err = decode_import_meta(names).unwrap_err();
    assert!(matches!(err, RigError::MetaDecode { .. }));
}

#[test]
fn export_envelope_round_trips() {
    let mut deltas = BTreeMap::new();
    deltas.insert(
        "Arm".to_string(),
        CFrame([0.125, -2.5, 0.0, 0., 0., 1., 0., 1., 0., -1., 0., 0.]),
    );
    let payload = AnimationPayload {
        duration: 1.5,
        kfs: vec![
            PoseFrame {
                time: 0.0,
                deltas: BTreeMap::new(),
            },
            PoseFrame { time: 1.5, deltas },
        ],
    };

    let blob = encode_export(&payload).unwrap();
    assert!(blob
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
    assert_eq!(decode_export(&blob).unwrap(), payload);
}

#[test]
fn corrupt_export_blob_is_rejected() {
    assert!(decode_export("not base64 at all!").is_err());
    // Valid base64 but not a zlib stream.
    assert!(decode_export("aGVsbG8=").is_err());
}
