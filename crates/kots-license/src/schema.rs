//! Schema generations and the traits the shared validator is generic over.
//!
//! A `kots.io` License exists in two incompatible generations. Both run the
//! same verification chain; they differ in the hash algorithm, in the inner
//! envelope field names and in the document types. [`SignedLicense`] and
//! [`SignedEntitlement`] capture exactly those differences.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::crypto::HashAlgorithm;
use crate::reconcile::SpecFields;

/// API group every License document belongs to.
pub const LICENSE_GROUP: &str = "kots.io";

/// Kind of every License document.
pub const LICENSE_KIND: &str = "License";

/// License schema generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Generation 1: MD5 digests, `licenseSignature`/`keySignature`.
    V1Beta1,
    /// Generation 2: SHA-256 digests, `v2LicenseSignature`/`v2KeySignature`.
    V1Beta2,
}

impl SchemaVersion {
    /// Version segment of the `apiVersion` header.
    pub fn version(self) -> &'static str {
        match self {
            Self::V1Beta1 => "v1beta1",
            Self::V1Beta2 => "v1beta2",
        }
    }

    /// Full `apiVersion` value, e.g. `kots.io/v1beta1`.
    pub fn api_version(self) -> String {
        format!("{}/{}", LICENSE_GROUP, self.version())
    }

    /// Digest used for every signature of this generation.
    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::V1Beta1 => HashAlgorithm::Md5,
            Self::V1Beta2 => HashAlgorithm::Sha256,
        }
    }

    /// Parse the version segment of an `apiVersion`.
    pub fn from_version(version: &str) -> Option<Self> {
        match version {
            "v1beta1" => Some(Self::V1Beta1),
            "v1beta2" => Some(Self::V1Beta2),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

/// A License document of one generation.
pub trait SignedLicense: DeserializeOwned {
    /// Generation this document type belongs to.
    const SCHEMA: SchemaVersion;

    /// Entitlement field type of this generation.
    type Entitlement: SignedEntitlement;

    /// Spec type, compared field by field during reconciliation.
    type Spec: SpecFields<Entitlement = Self::Entitlement>;

    fn spec(&self) -> &Self::Spec;

    fn license_id(&self) -> &str;

    fn app_slug(&self) -> &str;

    /// Raw two-layer signature envelope.
    fn raw_signature(&self) -> &[u8];

    /// Replace the spec with the signed one while keeping the raw signature.
    fn adopt_signed_spec(&mut self, signed: Self);
}

/// An entitlement field that may carry its own signature.
pub trait SignedEntitlement {
    /// Generation this field type belongs to.
    const SCHEMA: SchemaVersion;

    /// Signature bytes, or `None` when the field is unsigned.
    fn signature_bytes(&self) -> Option<&[u8]>;

    /// Exact text the issuer signed for this field.
    fn signing_message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_round_trip() {
        for schema in [SchemaVersion::V1Beta1, SchemaVersion::V1Beta2] {
            assert_eq!(SchemaVersion::from_version(schema.version()), Some(schema));
        }
        assert_eq!(SchemaVersion::from_version("v1"), None);
        assert_eq!(SchemaVersion::V1Beta2.api_version(), "kots.io/v1beta2");
    }

    #[test]
    fn test_hash_per_generation() {
        assert_eq!(SchemaVersion::V1Beta1.hash_algorithm(), HashAlgorithm::Md5);
        assert_eq!(SchemaVersion::V1Beta2.hash_algorithm(), HashAlgorithm::Sha256);
    }
}
