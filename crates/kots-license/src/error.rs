//! Error types for license verification.

use std::fmt;
use std::path::PathBuf;

use crate::schema::SchemaVersion;

/// Layer of the signature envelope that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// The outer `{licenseData, innerSignature}` JSON.
    Outer,
    /// The inner envelope carrying the issuer key and signatures.
    Inner,
    /// The key signature JSON embedded in the inner envelope.
    KeySignature,
    /// The canonical license body inside the outer envelope.
    LicenseData,
}

impl fmt::Display for EnvelopeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Outer => "outer signature",
            Self::Inner => "inner signature",
            Self::KeySignature => "key signature",
            Self::LicenseData => "signed license data",
        };
        f.write_str(label)
    }
}

/// A trust-relevant field whose on-disk value differs from the signed value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "license data validation error: {field} field has changed to {actual:?} (license) from {signed:?} (within signature)"
)]
pub struct LicenseDataMismatch {
    /// Field path, e.g. `appSlug` or `channels[0].channelID`.
    pub field: String,
    /// Value found in the document being verified.
    pub actual: String,
    /// Value inside the signed license data.
    pub signed: String,
}

/// License verification errors.
#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    /// One layer of the signature envelope is malformed.
    #[error("failed to decode {stage}: {reason}")]
    EnvelopeDecode { stage: EnvelopeStage, reason: String },

    /// PEM could not be decoded or the key is not an RSA public key.
    #[error("failed to parse public key: {reason}")]
    KeyParse { reason: String },

    /// No trusted global key exists for the requested id.
    #[error("global public key not found for key ID: {key_id}")]
    GlobalKeyNotFound { key_id: String },

    /// The inner envelope lacks a signature this schema needs.
    #[error("{schema} {what} not found")]
    SignatureMissing {
        schema: SchemaVersion,
        what: &'static str,
    },

    /// Low-level RSA-PSS verification failure.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// The issuer key was not signed by the named global key.
    #[error("failed to verify {schema} key signature: {reason}")]
    KeySignatureInvalid {
        schema: SchemaVersion,
        reason: String,
    },

    /// The canonical license body was not signed by the issuer key.
    #[error("failed to verify {schema} license signature: {reason}")]
    LicenseSignatureInvalid {
        schema: SchemaVersion,
        reason: String,
    },

    /// An entitlement carries a signature that does not match its value.
    #[error("entitlement {field} signature is invalid: {reason}")]
    EntitlementSignatureInvalid { field: String, reason: String },

    /// An entitlement has no signature to check.
    #[error("entitlement {field} has no signature")]
    EntitlementSignatureMissing { field: String },

    /// The document differs from its signed license data.
    #[error(transparent)]
    DataMismatch(#[from] LicenseDataMismatch),

    /// The document is not a `kots.io` License in a known version.
    #[error("unsupported license schema: apiVersion={api_version:?} kind={kind:?}")]
    UnsupportedSchema { api_version: String, kind: String },

    /// An entitlement value is neither string, integer nor boolean.
    #[error("unknown license value type: {raw}")]
    UnknownValueType { raw: String },

    /// The document is not valid YAML/JSON for its schema.
    #[error("failed to decode license data: {reason}")]
    Decode { reason: String },

    /// Reading a license or key file failed.
    #[error("failed to read {what} {}: {source}", path.display())]
    Io {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LicenseError {
    /// Whether the error is a reconciliation mismatch between the document and its signed data.
    pub fn is_data_mismatch(&self) -> bool {
        matches!(self, Self::DataMismatch(_))
    }

    /// The structured mismatch, if this is one.
    pub fn data_mismatch(&self) -> Option<&LicenseDataMismatch> {
        match self {
            Self::DataMismatch(mismatch) => Some(mismatch),
            _ => None,
        }
    }

    /// Whether the error means a signature in the chain did not verify.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid { .. }
                | Self::KeySignatureInvalid { .. }
                | Self::LicenseSignatureInvalid { .. }
                | Self::EntitlementSignatureInvalid { .. }
        )
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
