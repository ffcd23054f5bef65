//! Field-by-field comparison of a license against its signed data.
//!
//! Each generation describes its trust-relevant fields as ordered tables of
//! (field path, renderer) pairs through [`impl_spec_fields!`]. The first
//! field whose rendering differs is reported. Channels compare by position;
//! entitlements compare by key.

use std::collections::BTreeMap;

use crate::error::LicenseDataMismatch;

/// Rendering of an entitlement key that the signed data lacks.
pub const MISSING_TEXT: &str = "<missing>";

/// One compared field.
pub struct FieldCheck<T> {
    /// Field path segment as it appears in errors.
    pub name: &'static str,
    /// Canonical text of the field; equal text means equal field.
    pub render: fn(&T) -> String,
}

/// Spec types that can be reconciled against their signed copy.
pub trait SpecFields: Sized + 'static {
    type Channel: 'static;
    type Entitlement: 'static;

    /// Scalar spec fields, in comparison order.
    const FIELDS: &'static [FieldCheck<Self>];
    const CHANNEL_FIELDS: &'static [FieldCheck<Self::Channel>];
    const ENTITLEMENT_FIELDS: &'static [FieldCheck<Self::Entitlement>];

    fn channels(&self) -> &[Self::Channel];
    fn entitlements(&self) -> &BTreeMap<String, Self::Entitlement>;
}

/// Compare `actual` (the document at hand) against `signed`.
pub fn diff_specs<S: SpecFields>(actual: &S, signed: &S) -> Result<(), LicenseDataMismatch> {
    compare_fields(S::FIELDS, "", actual, signed)?;

    let (actual_channels, signed_channels) = (actual.channels(), signed.channels());
    if actual_channels.len() != signed_channels.len() {
        return Err(mismatch(
            "channels length".to_string(),
            actual_channels.len().to_string(),
            signed_channels.len().to_string(),
        ));
    }
    for (i, (a, s)) in actual_channels.iter().zip(signed_channels).enumerate() {
        compare_fields(S::CHANNEL_FIELDS, &format!("channels[{}].", i), a, s)?;
    }

    let (actual_entitlements, signed_entitlements) = (actual.entitlements(), signed.entitlements());
    if actual_entitlements.len() != signed_entitlements.len() {
        return Err(mismatch(
            "entitlements length".to_string(),
            actual_entitlements.len().to_string(),
            signed_entitlements.len().to_string(),
        ));
    }
    for (key, a) in actual_entitlements {
        let Some(s) = signed_entitlements.get(key) else {
            return Err(mismatch(
                format!("entitlements[{}]", key),
                MISSING_TEXT.to_string(),
                String::new(),
            ));
        };
        compare_fields(S::ENTITLEMENT_FIELDS, &format!("entitlements[{}].", key), a, s)?;
    }

    Ok(())
}

fn compare_fields<T>(
    checks: &[FieldCheck<T>],
    prefix: &str,
    actual: &T,
    signed: &T,
) -> Result<(), LicenseDataMismatch> {
    for check in checks {
        let (a, s) = ((check.render)(actual), (check.render)(signed));
        if a != s {
            return Err(mismatch(format!("{}{}", prefix, check.name), a, s));
        }
    }
    Ok(())
}

fn mismatch(field: String, actual: String, signed: String) -> LicenseDataMismatch {
    LicenseDataMismatch {
        field,
        actual,
        signed,
    }
}

/// Implement [`SpecFields`] for a generation's spec type.
///
/// Both generations share field names, so one table serves both.
macro_rules! impl_spec_fields {
    (@checks $ty:ty { $($name:literal => |$s:ident| $render:expr,)* }) => {
        &[$($crate::reconcile::FieldCheck { name: $name, render: |$s: &$ty| $render },)*]
    };
    ($spec:ty, $channel:ty, $entitlement:ty) => {
        impl $crate::reconcile::SpecFields for $spec {
            type Channel = $channel;
            type Entitlement = $entitlement;

            const FIELDS: &'static [$crate::reconcile::FieldCheck<Self>] =
                $crate::reconcile::impl_spec_fields!(@checks $spec {
                    "appSlug" => |s| s.app_slug.clone(),
                    "endpoint" => |s| s.endpoint.clone(),
                    "replicatedProxyDomain" => |s| s.replicated_proxy_domain.clone(),
                    "customerID" => |s| s.customer_id.clone(),
                    "customerName" => |s| s.customer_name.clone(),
                    "customerEmail" => |s| s.customer_email.clone(),
                    "channelID" => |s| s.channel_id.clone(),
                    "channelName" => |s| s.channel_name.clone(),
                    "licenseSequence" => |s| s.license_sequence.to_string(),
                    "licenseID" => |s| s.license_id.clone(),
                    "licenseType" => |s| s.license_type.clone(),
                    "isAirgapSupported" => |s| s.is_airgap_supported.to_string(),
                    "isGitOpsSupported" => |s| s.is_git_ops_supported.to_string(),
                    "isIdentityServiceSupported" => |s| s.is_identity_service_supported.to_string(),
                    "isGeoaxisSupported" => |s| s.is_geoaxis_supported.to_string(),
                    "isSnapshotSupported" => |s| s.is_snapshot_supported.to_string(),
                    "isDisasterRecoverySupported" => |s| s.is_disaster_recovery_supported.to_string(),
                    "isSupportBundleUploadSupported" => |s| s.is_support_bundle_upload_supported.to_string(),
                    "isSemverRequired" => |s| s.is_semver_required.to_string(),
                    "isEmbeddedClusterDownloadEnabled" => |s| s.is_embedded_cluster_download_enabled.to_string(),
                    "isEmbeddedClusterMultiNodeEnabled" => |s| s.is_embedded_cluster_multi_node_enabled.to_string(),
                });

            const CHANNEL_FIELDS: &'static [$crate::reconcile::FieldCheck<$channel>] =
                $crate::reconcile::impl_spec_fields!(@checks $channel {
                    "channelID" => |c| c.channel_id.clone(),
                    "channelName" => |c| c.channel_name.clone(),
                    "channelSlug" => |c| c.channel_slug.clone(),
                    "isDefault" => |c| c.is_default.to_string(),
                    "endpoint" => |c| c.endpoint.clone(),
                    "replicatedProxyDomain" => |c| c.replicated_proxy_domain.clone(),
                    "isSemverRequired" => |c| c.is_semver_required.to_string(),
                });

            const ENTITLEMENT_FIELDS: &'static [$crate::reconcile::FieldCheck<$entitlement>] =
                $crate::reconcile::impl_spec_fields!(@checks $entitlement {
                    "title" => |e| e.title.clone(),
                    "description" => |e| e.description.clone(),
                    "valueType" => |e| e.value_type.clone(),
                    "isHidden" => |e| e.is_hidden.to_string(),
                    "value.type" => |e| $crate::value::kind_text(e.value_kind()),
                    "value" => |e| $crate::schema::SignedEntitlement::signing_message(e),
                });

            fn channels(&self) -> &[$channel] {
                &self.channels
            }

            fn entitlements(&self) -> &::std::collections::BTreeMap<String, $entitlement> {
                &self.entitlements
            }
        }
    };
}

pub(crate) use impl_spec_fields;
