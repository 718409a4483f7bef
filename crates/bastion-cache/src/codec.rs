//! Encoding of cached values.
//!
//! Values are stored as JSON. Confirmed absence is stored as the bare
//! sentinel `*`, which can never be produced by JSON encoding: every JSON
//! document starts with one of `{["tfn-` or a digit.

use bastion_core::BastionResult;
use serde::{de::DeserializeOwned, Serialize};

/// Value stored in place of an entry whose absence has been confirmed.
pub const NOT_FOUND_PLACEHOLDER: &str = "*";

/// Anything the cache can store.
pub trait Cacheable: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// Decoded form of a raw cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue<T> {
    /// A real value.
    Present(T),
    /// The negative-cache marker.
    Absent,
}

/// Returns true if `raw` is the negative-cache marker.
#[must_use]
pub fn is_placeholder(raw: &str) -> bool {
    raw == NOT_FOUND_PLACEHOLDER
}

/// Encodes a value for storage.
pub fn encode<T: Serialize>(value: &T) -> BastionResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a stored value, recognizing the negative-cache marker.
pub fn decode<T: DeserializeOwned>(raw: &str) -> BastionResult<CachedValue<T>> {
    if is_placeholder(raw) {
        return Ok(CachedValue::Absent);
    }
    Ok(CachedValue::Present(serde_json::from_str(raw)?))
}

/// Returns true if `raw` is the marker or decodes as `T`.
#[must_use]
pub fn is_decodable<T: DeserializeOwned>(raw: &str) -> bool {
    is_placeholder(raw) || serde_json::from_str::<T>(raw).is_ok()
}
