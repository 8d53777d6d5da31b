//! Transport codecs at the pipeline's edges.
//!
//! Inbound: rig metadata arrives base32-encoded and split across the names of
//! carrier objects (`Meta<index>q1<chunk>q1...`); chunks are reassembled in
//! index order, padding is restored, and the JSON is decoded. Outbound: the
//! animation payload is minified, deflate-compressed, and base64-encoded into
//! a single text blob for the clipboard/transport collaborator.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use data_encoding::BASE32;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::descriptor::RigMetadata;
use crate::error::RigError;
use crate::pose::AnimationPayload;

/// Carrier object names: `Meta<index>q1<chunk>q1` plus the host's optional
/// duplicate-name suffix.
static META_CARRIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Meta(\d+)q1(.*?)q1\d*(\.\d+)?$").expect("static pattern"));

/// Part autonaming: `<rigName><index>1` with an optional `.NNN` suffix,
/// case-insensitive, matched at the start of the object name.
fn part_pattern(rig_name: &str) -> Regex {
    Regex::new(&format!(r"(?i)^{}(\d+)1(\.\d+)?", regex::escape(rig_name)))
        .expect("escaped pattern")
}

/// Reassemble and decode the import metadata from carrier object names.
///
/// Chunks are keyed by their 1-based index; a hole in the sequence is a fatal
/// decode error. `'0'` is the carrier alphabet's stand-in for base32 `'='`
/// padding.
pub fn decode_import_meta<'a, I>(object_names: I) -> Result<RigMetadata, RigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut partial: BTreeMap<usize, String> = BTreeMap::new();
    for name in object_names {
        if let Some(caps) = META_CARRIER.captures(name) {
            let index: usize = caps[1].parse().map_err(|_| RigError::MetaPattern)?;
            partial.insert(index, caps[2].to_string());
        }
    }
    if partial.is_empty() {
        return Err(RigError::MetaPattern);
    }

    let mut encoded = String::new();
    for index in 1..=partial.len() {
        let chunk = partial
            .get(&index)
            .ok_or(RigError::MissingMetaChunk { index })?;
        encoded.push_str(chunk);
    }
    let encoded = encoded.replace('0', "=").to_ascii_uppercase();

    let bytes = BASE32
        .decode(encoded.as_bytes())
        .map_err(|e| RigError::MetaDecode {
            reason: e.to_string(),
        })?;
    let text = String::from_utf8(bytes).map_err(|e| RigError::MetaDecode {
        reason: e.to_string(),
    })?;
    debug!("decoded {} metadata chunks ({} bytes)", partial.len(), text.len());
    Ok(serde_json::from_str(&text)?)
}

/// Rename mapping for imported parts: carrier meshes are numbered
/// `<rigName><index>1`; the metadata's `parts` list holds their real names in
/// the same order. Names with no match, or an out-of-range index, are skipped.
pub fn autoname_parts(meta: &RigMetadata, object_names: &[String]) -> Vec<(String, String)> {
    let pattern = part_pattern(&meta.rig_name);
    let mut renames = Vec::new();
    for name in object_names {
        if let Some(caps) = pattern.captures(name) {
            let index: usize = match caps[1].parse() {
                Ok(i) => i,
                Err(_) => continue,
            };
            if index >= 1 && index <= meta.parts.len() {
                renames.push((name.clone(), meta.parts[index - 1].clone()));
            }
        }
    }
    renames
}

/// Minify, deflate, and base64 the export payload into a single text blob.
pub fn encode_export(payload: &AnimationPayload) -> Result<String, RigError> {
    let json = serde_json::to_string(payload)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(json.as_bytes())
        .map_err(compression_err)?;
    let compressed = encoder.finish().map_err(compression_err)?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`encode_export`]; used by tests and downstream tooling.
pub fn decode_export(blob: &str) -> Result<AnimationPayload, RigError> {
    let compressed = BASE64.decode(blob).map_err(|e| RigError::Compression {
        reason: e.to_string(),
    })?;
    let mut json = String::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .map_err(compression_err)?;
    Ok(serde_json::from_str(&json)?)
}

fn compression_err(e: std::io::Error) -> RigError {
    RigError::Compression {
        reason: e.to_string(),
    }
}
