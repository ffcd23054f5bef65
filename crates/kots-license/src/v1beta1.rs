//! `kots.io/v1beta1` License.
//!
//! Signatures use MD5 digests. Entitlement values distinguish a missing
//! `value` key ([`FieldValue::Absent`], signed as `<nil>`) from any present
//! value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LicenseResult;
use crate::meta::{is_false, is_zero, ObjectMeta, TypeMeta};
use crate::reconcile::impl_spec_fields;
use crate::schema::{SchemaVersion, SignedEntitlement, SignedLicense, LICENSE_KIND};
use crate::signature::AppSigningKeys;
use crate::validate::{verify_entitlement, LicenseValidator};
use crate::value::{FieldValue, ValueKind};

/// Per-entitlement signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementFieldSignature {
    #[serde(default, with = "crate::b64", skip_serializing_if = "Vec::is_empty")]
    pub v1: Vec<u8>,
}

/// Named entitlement granted by the license.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementField {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "FieldValue::is_absent")]
    pub value: FieldValue,

    /// Declared type label; advisory only.
    #[serde(rename = "valueType", default, skip_serializing_if = "String::is_empty")]
    pub value_type: String,

    #[serde(rename = "isHidden", default, skip_serializing_if = "is_false")]
    pub is_hidden: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<EntitlementFieldSignature>,
}

impl EntitlementField {
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.value.kind()
    }

    /// Verify this field's signature with the issuer key of its license.
    pub fn validate_signature(&self, name: &str, app_keys: &AppSigningKeys) -> LicenseResult<()> {
        verify_entitlement(name, self, app_keys)
    }
}

impl SignedEntitlement for EntitlementField {
    const SCHEMA: SchemaVersion = SchemaVersion::V1Beta1;

    fn signature_bytes(&self) -> Option<&[u8]> {
        self.signature
            .as_ref()
            .map(|s| s.v1.as_slice())
            .filter(|sig| !sig.is_empty())
    }

    fn signing_message(&self) -> String {
        self.value.to_string()
    }
}

/// Distribution channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "channelID", default)]
    pub channel_id: String,

    #[serde(rename = "channelName", default, skip_serializing_if = "String::is_empty")]
    pub channel_name: String,

    #[serde(rename = "channelSlug", default, skip_serializing_if = "String::is_empty")]
    pub channel_slug: String,

    #[serde(rename = "isDefault", default, skip_serializing_if = "is_false")]
    pub is_default: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    #[serde(
        rename = "replicatedProxyDomain",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub replicated_proxy_domain: String,

    #[serde(rename = "isSemverRequired", default, skip_serializing_if = "is_false")]
    pub is_semver_required: bool,
}

/// License spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LicenseSpec {
    /// Two-layer signature envelope, base64 on the wire.
    #[serde(with = "crate::b64")]
    pub signature: Vec<u8>,
    pub app_slug: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub replicated_proxy_domain: String,
    #[serde(rename = "customerID", skip_serializing_if = "String::is_empty")]
    pub customer_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub customer_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub customer_email: String,
    #[serde(rename = "channelID", skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
    #[serde(skip_serializing_if = "is_zero")]
    pub license_sequence: i64,
    #[serde(rename = "licenseID")]
    pub license_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license_type: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_airgap_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_git_ops_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_identity_service_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_geoaxis_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_snapshot_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_disaster_recovery_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_support_bundle_upload_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_semver_required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_embedded_cluster_download_enabled: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_embedded_cluster_multi_node_enabled: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entitlements: BTreeMap<String, EntitlementField>,
}

impl_spec_fields!(LicenseSpec, Channel, EntitlementField);

/// `kots.io/v1beta1` License document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: LicenseSpec,
}

impl License {
    /// New document with the v1beta1 header.
    pub fn new(name: impl Into<String>, spec: LicenseSpec) -> Self {
        Self {
            api_version: SchemaVersion::V1Beta1.api_version(),
            kind: LICENSE_KIND.to_string(),
            metadata: ObjectMeta {
                name: name.into(),
                ..Default::default()
            },
            spec,
        }
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Verify the signature chain against the process-wide trusted keys.
    ///
    /// See [`LicenseValidator::validate`].
    pub fn validate_license(&mut self) -> LicenseResult<AppSigningKeys> {
        LicenseValidator::global().validate(self)
    }
}

impl SignedLicense for License {
    const SCHEMA: SchemaVersion = SchemaVersion::V1Beta1;
    type Entitlement = EntitlementField;
    type Spec = LicenseSpec;

    fn spec(&self) -> &LicenseSpec {
        &self.spec
    }

    fn license_id(&self) -> &str {
        &self.spec.license_id
    }

    fn app_slug(&self) -> &str {
        &self.spec.app_slug
    }

    fn raw_signature(&self) -> &[u8] {
        &self.spec.signature
    }

    fn adopt_signed_spec(&mut self, signed: Self) {
        let signature = std::mem::take(&mut self.spec.signature);
        self.spec = signed.spec;
        self.spec.signature = signature;
    }
}
