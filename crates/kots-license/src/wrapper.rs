//! Version-agnostic access to License documents.
//!
//! [`load_license_from_bytes`] reads the `apiVersion`/`kind` header, rejects
//! anything that is not a `kots.io` License, and decodes the body as the
//! matching generation. [`LicenseWrapper`] then exposes both generations
//! through one set of accessors. Generation-2 channels are returned in the
//! generation-1 shape; entitlements are returned as borrowed
//! [`EntitlementFieldWrapper`]s.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{LicenseError, LicenseResult};
use crate::meta::TypeMeta;
use crate::schema::{SchemaVersion, SignedEntitlement, LICENSE_GROUP, LICENSE_KIND};
use crate::signature::AppSigningKeys;
use crate::validate::{verify_entitlement, LicenseValidator};
use crate::value::FieldValue;
use crate::{v1beta1, v1beta2};

/// A License of either generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseWrapper {
    V1(Box<v1beta1::License>),
    V2(Box<v1beta2::License>),
}

/// Read and decode a License file.
pub fn load_license_from_path(path: impl AsRef<Path>) -> LicenseResult<LicenseWrapper> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| LicenseError::Io {
        what: "license file",
        path: path.to_path_buf(),
        source,
    })?;
    load_license_from_bytes(&data)
}

/// Decode License YAML or JSON of either generation.
pub fn load_license_from_bytes(data: &[u8]) -> LicenseResult<LicenseWrapper> {
    let document: serde_yaml::Value = serde_yaml::from_slice(data).map_err(decode_error)?;
    let type_meta: TypeMeta = serde_yaml::from_value(document.clone()).map_err(decode_error)?;

    let (group, version) = type_meta.group_version();
    let schema = match SchemaVersion::from_version(version) {
        Some(schema) if group == LICENSE_GROUP && type_meta.kind == LICENSE_KIND => schema,
        _ => {
            warn!(
                api_version = %type_meta.api_version,
                kind = %type_meta.kind,
                "rejecting document that is not a supported License"
            );
            return Err(LicenseError::UnsupportedSchema {
                api_version: type_meta.api_version,
                kind: type_meta.kind,
            });
        }
    };
    debug!(schema = %schema, "decoding license");

    Ok(match schema {
        SchemaVersion::V1Beta1 => {
            LicenseWrapper::V1(Box::new(serde_yaml::from_value(document).map_err(decode_error)?))
        }
        SchemaVersion::V1Beta2 => {
            LicenseWrapper::V2(Box::new(serde_yaml::from_value(document).map_err(decode_error)?))
        }
    })
}

fn decode_error(err: serde_yaml::Error) -> LicenseError {
    LicenseError::Decode {
        reason: err.to_string(),
    }
}

/// Read the same spec field from whichever generation is wrapped.
macro_rules! spec_field {
    ($wrapper:expr, $field:ident) => {
        match $wrapper {
            LicenseWrapper::V1(license) => &license.spec.$field,
            LicenseWrapper::V2(license) => &license.spec.$field,
        }
    };
}

impl LicenseWrapper {
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            Self::V1(_) => SchemaVersion::V1Beta1,
            Self::V2(_) => SchemaVersion::V1Beta2,
        }
    }

    pub fn is_v1(&self) -> bool {
        matches!(self, Self::V1(_))
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, Self::V2(_))
    }

    pub fn as_v1(&self) -> Option<&v1beta1::License> {
        match self {
            Self::V1(license) => Some(license),
            Self::V2(_) => None,
        }
    }

    pub fn as_v2(&self) -> Option<&v1beta2::License> {
        match self {
            Self::V1(_) => None,
            Self::V2(license) => Some(license),
        }
    }

    /// Verify the signature chain against the process-wide trusted keys.
    ///
    /// The wrapped document is rewritten with its signed values; see
    /// [`LicenseValidator::validate`].
    pub fn verify_signature(&mut self) -> LicenseResult<AppSigningKeys> {
        self.verify_signature_with(&LicenseValidator::global())
    }

    pub fn verify_signature_with(&mut self, validator: &LicenseValidator) -> LicenseResult<AppSigningKeys> {
        match self {
            Self::V1(license) => validator.validate(license.as_mut()),
            Self::V2(license) => validator.validate(license.as_mut()),
        }
    }

    /// Raw signature envelope.
    pub fn signature(&self) -> &[u8] {
        spec_field!(self, signature)
    }

    pub fn app_slug(&self) -> &str {
        spec_field!(self, app_slug)
    }

    pub fn license_id(&self) -> &str {
        spec_field!(self, license_id)
    }

    pub fn license_type(&self) -> &str {
        spec_field!(self, license_type)
    }

    pub fn license_sequence(&self) -> i64 {
        *spec_field!(self, license_sequence)
    }

    pub fn endpoint(&self) -> &str {
        spec_field!(self, endpoint)
    }

    pub fn replicated_proxy_domain(&self) -> &str {
        spec_field!(self, replicated_proxy_domain)
    }

    pub fn customer_id(&self) -> &str {
        spec_field!(self, customer_id)
    }

    pub fn customer_name(&self) -> &str {
        spec_field!(self, customer_name)
    }

    pub fn customer_email(&self) -> &str {
        spec_field!(self, customer_email)
    }

    pub fn channel_id(&self) -> &str {
        spec_field!(self, channel_id)
    }

    pub fn channel_name(&self) -> &str {
        spec_field!(self, channel_name)
    }

    /// Channels in the generation-1 shape.
    pub fn channels(&self) -> Vec<v1beta1::Channel> {
        match self {
            Self::V1(license) => license.spec.channels.clone(),
            Self::V2(license) => license
                .spec
                .channels
                .iter()
                .cloned()
                .map(v1beta1::Channel::from)
                .collect(),
        }
    }

    /// Entitlements by key.
    pub fn entitlements(&self) -> BTreeMap<&str, EntitlementFieldWrapper<'_>> {
        match self {
            Self::V1(license) => license
                .spec
                .entitlements
                .iter()
                .map(|(name, field)| (name.as_str(), EntitlementFieldWrapper::v1(name, field)))
                .collect(),
            Self::V2(license) => license
                .spec
                .entitlements
                .iter()
                .map(|(name, field)| (name.as_str(), EntitlementFieldWrapper::v2(name, field)))
                .collect(),
        }
    }

    pub fn entitlement(&self, name: &str) -> Option<EntitlementFieldWrapper<'_>> {
        match self {
            Self::V1(license) => license
                .spec
                .entitlements
                .get_key_value(name)
                .map(|(name, field)| EntitlementFieldWrapper::v1(name, field)),
            Self::V2(license) => license
                .spec
                .entitlements
                .get_key_value(name)
                .map(|(name, field)| EntitlementFieldWrapper::v2(name, field)),
        }
    }

    pub fn is_airgap_supported(&self) -> bool {
        *spec_field!(self, is_airgap_supported)
    }

    pub fn is_git_ops_supported(&self) -> bool {
        *spec_field!(self, is_git_ops_supported)
    }

    pub fn is_identity_service_supported(&self) -> bool {
        *spec_field!(self, is_identity_service_supported)
    }

    pub fn is_geoaxis_supported(&self) -> bool {
        *spec_field!(self, is_geoaxis_supported)
    }

    pub fn is_snapshot_supported(&self) -> bool {
        *spec_field!(self, is_snapshot_supported)
    }

    pub fn is_disaster_recovery_supported(&self) -> bool {
        *spec_field!(self, is_disaster_recovery_supported)
    }

    pub fn is_support_bundle_upload_supported(&self) -> bool {
        *spec_field!(self, is_support_bundle_upload_supported)
    }

    pub fn is_semver_required(&self) -> bool {
        *spec_field!(self, is_semver_required)
    }

    pub fn is_embedded_cluster_download_enabled(&self) -> bool {
        *spec_field!(self, is_embedded_cluster_download_enabled)
    }

    pub fn is_embedded_cluster_multi_node_enabled(&self) -> bool {
        *spec_field!(self, is_embedded_cluster_multi_node_enabled)
    }
}

impl From<v1beta1::License> for LicenseWrapper {
    fn from(license: v1beta1::License) -> Self {
        Self::V1(Box::new(license))
    }
}

impl From<v1beta2::License> for LicenseWrapper {
    fn from(license: v1beta2::License) -> Self {
        Self::V2(Box::new(license))
    }
}

/// Borrowed entitlement of either generation.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementFieldWrapper<'a> {
    name: &'a str,
    field: EntitlementRef<'a>,
}

#[derive(Debug, Clone, Copy)]
enum EntitlementRef<'a> {
    V1(&'a v1beta1::EntitlementField),
    V2(&'a v1beta2::EntitlementField),
}

macro_rules! entitlement_field {
    ($wrapper:expr, $field:ident) => {
        match $wrapper.field {
            EntitlementRef::V1(field) => &field.$field,
            EntitlementRef::V2(field) => &field.$field,
        }
    };
}

impl<'a> EntitlementFieldWrapper<'a> {
    fn v1(name: &'a str, field: &'a v1beta1::EntitlementField) -> Self {
        Self {
            name,
            field: EntitlementRef::V1(field),
        }
    }

    fn v2(name: &'a str, field: &'a v1beta2::EntitlementField) -> Self {
        Self {
            name,
            field: EntitlementRef::V2(field),
        }
    }

    /// Key of this entitlement in the license.
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn title(&self) -> &'a str {
        entitlement_field!(self, title)
    }

    pub fn description(&self) -> &'a str {
        entitlement_field!(self, description)
    }

    /// Value in the generation-neutral shape. Generation-2 values are never absent.
    pub fn value(&self) -> FieldValue {
        match self.field {
            EntitlementRef::V1(field) => field.value.clone(),
            EntitlementRef::V2(field) => FieldValue::Present(field.value.clone()),
        }
    }

    /// Declared type label, as written by the issuer.
    pub fn value_type(&self) -> &'a str {
        entitlement_field!(self, value_type)
    }

    pub fn is_hidden(&self) -> bool {
        *entitlement_field!(self, is_hidden)
    }

    /// Signature of this generation, `None` when unsigned.
    pub fn signature(&self) -> Option<&'a [u8]> {
        match self.field {
            EntitlementRef::V1(field) => field.signature_bytes(),
            EntitlementRef::V2(field) => field.signature_bytes(),
        }
    }

    /// Verify this entitlement against the issuer key returned by license verification.
    pub fn verify_signature(&self, app_keys: &AppSigningKeys) -> LicenseResult<()> {
        match self.field {
            EntitlementRef::V1(field) => verify_entitlement(self.name, field, app_keys),
            EntitlementRef::V2(field) => verify_entitlement(self.name, field, app_keys),
        }
    }
}
