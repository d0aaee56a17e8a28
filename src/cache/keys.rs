//! Cache key derivation and artifact path conventions.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::domain::fragments::{CacheKey, FragmentId, RequirementSet, is_truthy};

/// Drop every falsy requirement, keeping the remaining values untouched.
pub fn filter_requirements(requirements: RequirementSet) -> RequirementSet {
    requirements
        .into_iter()
        .filter(|(_, value)| is_truthy(value))
        .collect()
}

/// Derive the cache key for a fragment and its filtered requirements.
///
/// Each field is written as a little-endian length followed by its bytes so
/// that no two distinct inputs share an encoding. Values are hashed as JSON,
/// which keeps object keys sorted, and requirement order does not matter
/// because the set iterates by name.
pub fn derive_cache_key(fragment: &FragmentId, requirements: &RequirementSet) -> CacheKey {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, fragment.as_str().as_bytes());
    write_len(&mut hasher, requirements.len());
    for (name, value) in requirements.iter() {
        write_field(&mut hasher, name.as_bytes());
        write_field(&mut hasher, value.to_string().as_bytes());
    }
    CacheKey::from_digest(hex::encode(hasher.finalize()))
}

/// Store path of a fragment artifact, relative to the tenant scope.
pub fn fragment_path(fragment: &FragmentId, key: &CacheKey) -> String {
    format!("{}/{key}/fragment.html", fragment_prefix(fragment))
}

/// Store prefix holding every artifact of one fragment.
pub fn fragment_prefix(fragment: &FragmentId) -> String {
    format!("{FRAGMENTS_ROOT}/{}", path_segment(fragment))
}

/// Store path of a rendition record, relative to the tenant scope.
pub fn rendition_path(fragment: &FragmentId, key: &CacheKey) -> String {
    format!("{RENDITIONS_ROOT}/{}/{key}.json", path_segment(fragment))
}

/// Percent-encode an identity into one directory name.
///
/// Unreserved ASCII passes through, except a leading `.`, so no identity can
/// turn into a separator, a dot segment or a hidden entry.
pub fn path_segment(fragment: &FragmentId) -> String {
    let raw = fragment.as_str();
    let mut segment = String::with_capacity(raw.len());
    for (index, byte) in raw.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_' | b'~')
            || (byte == b'.' && index > 0);
        if plain {
            segment.push(char::from(byte));
        } else {
            let _ = write!(segment, "%{byte:02X}");
        }
    }
    segment
}

pub const FRAGMENTS_ROOT: &str = "fragments";
pub const RENDITIONS_ROOT: &str = "renditions";

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    write_len(hasher, bytes.len());
    hasher.update(bytes);
}
