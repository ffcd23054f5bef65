//! License signature envelope.
//!
//! `spec.signature` holds two JSON layers:
//!
//! ```text
//! OuterSignature { licenseData, innerSignature }
//!                                 └─ InnerSignature { publicKey, licenseSignature, keySignature,
//!                                                     v2LicenseSignature, v2KeySignature }
//!                                                                          └─ KeySignature { signature, globalKeyId }
//! ```
//!
//! All byte fields are base64 strings inside the JSON.

use rsa::RsaPublicKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::parse_public_key_pem;
use crate::error::{EnvelopeStage, LicenseError, LicenseResult};
use crate::schema::SchemaVersion;

/// Outer layer: the signed license bytes plus the inner envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OuterSignature {
    /// Canonical license JSON exactly as signed.
    #[serde(rename = "licenseData", default, with = "crate::b64")]
    pub license_data: Vec<u8>,

    /// JSON bytes of the [`InnerSignature`].
    #[serde(rename = "innerSignature", default, with = "crate::b64")]
    pub inner_signature: Vec<u8>,
}

/// Inner layer: issuer key and per-generation signatures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnerSignature {
    #[serde(
        rename = "licenseSignature",
        default,
        with = "crate::b64",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub license_signature: Vec<u8>,

    #[serde(
        rename = "v2LicenseSignature",
        default,
        with = "crate::b64",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub v2_license_signature: Vec<u8>,

    /// Issuer public key, PEM text. Also the message of the key signature.
    #[serde(rename = "publicKey", default)]
    pub public_key: String,

    #[serde(
        rename = "keySignature",
        default,
        with = "crate::b64",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub key_signature: Vec<u8>,

    #[serde(
        rename = "v2KeySignature",
        default,
        with = "crate::b64",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub v2_key_signature: Vec<u8>,
}

impl InnerSignature {
    /// License body signature for `schema`, if present.
    pub fn license_signature_for(&self, schema: SchemaVersion) -> Option<&[u8]> {
        let sig = match schema {
            SchemaVersion::V1Beta1 => &self.license_signature,
            SchemaVersion::V1Beta2 => &self.v2_license_signature,
        };
        non_empty(sig)
    }

    /// Key signature JSON for `schema`, if present.
    pub fn key_signature_for(&self, schema: SchemaVersion) -> Option<&[u8]> {
        let sig = match schema {
            SchemaVersion::V1Beta1 => &self.key_signature,
            SchemaVersion::V1Beta2 => &self.v2_key_signature,
        };
        non_empty(sig)
    }
}

fn non_empty(bytes: &[u8]) -> Option<&[u8]> {
    (!bytes.is_empty()).then_some(bytes)
}

/// Issuer key signed by a global key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySignature {
    #[serde(default, with = "crate::b64")]
    pub signature: Vec<u8>,

    #[serde(rename = "globalKeyId", default)]
    pub global_key_id: String,
}

impl KeySignature {
    /// Decode the key signature JSON carried in the inner envelope.
    pub fn from_json(bytes: &[u8]) -> LicenseResult<Self> {
        decode_object(bytes, EnvelopeStage::KeySignature)
    }
}

/// Decode one envelope layer, which must be a JSON object.
fn decode_object<T: DeserializeOwned>(bytes: &[u8], stage: EnvelopeStage) -> LicenseResult<T> {
    let decode_error = |reason: String| LicenseError::EnvelopeDecode { stage, reason };

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string()))?;
    if !value.is_object() {
        return Err(decode_error(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Issuer key resolved from a license, reusable for entitlement checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSigningKeys {
    public_key: RsaPublicKey,
}

impl AppSigningKeys {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self { public_key }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

/// Fully decoded signature envelope.
#[derive(Debug, Clone)]
pub struct DecodedSignature {
    pub outer: OuterSignature,
    pub inner: InnerSignature,
    pub app_keys: AppSigningKeys,
}

/// Decode both envelope layers and parse the issuer key.
///
/// `signature` is the already base64-decoded `spec.signature`.
pub fn decode_license_signature(signature: &[u8]) -> LicenseResult<DecodedSignature> {
    let outer: OuterSignature = decode_object(signature, EnvelopeStage::Outer)?;
    let inner: InnerSignature = decode_object(&outer.inner_signature, EnvelopeStage::Inner)?;

    let public_key = parse_public_key_pem(&inner.public_key).map_err(|e| match e {
        LicenseError::KeyParse { reason } => LicenseError::KeyParse {
            reason: format!("app public key: {}", reason),
        },
        other => other,
    })?;

    debug!(
        license_data_len = outer.license_data.len(),
        "decoded license signature envelope"
    );

    Ok(DecodedSignature {
        outer,
        inner,
        app_keys: AppSigningKeys::new(public_key),
    })
}
