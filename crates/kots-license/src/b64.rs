//! Serde adapter for byte fields carried as base64 strings.
//!
//! Use with `#[serde(with = "crate::b64")]`. Missing or `null` values decode
//! to an empty buffer; line breaks inside the text are ignored.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&BASE64.encode(bytes.as_ref()))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    decode(&text).map_err(de::Error::custom)
}

/// Decode standard base64, skipping CR/LF.
pub(crate) fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if text.contains(['\r', '\n']) {
        let joined: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        BASE64.decode(joined)
    } else {
        BASE64.decode(text)
    }
}
