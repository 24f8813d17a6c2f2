use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes `value` as a msgpack map keyed by field name.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decodes `bytes` into `T`. An empty payload decodes to `T::default()`.
pub fn decode<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.is_empty() {
        return Ok(T::default());
    }
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Like [`decode`] for shapes with no meaningful zero value.
pub fn decode_strict<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
