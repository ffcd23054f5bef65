//! License signature chain.
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. Decode the signature envelope.
//! 2. Decode the generation's key signature.
//! 3. Verify the issuer public key against the named global key.
//! 4. Verify the canonical license data against the issuer key.
//! 5. Reconcile the document with the canonical license data.
//! 6. Verify every signed entitlement against the issuer key.
//!
//! Once step 4 passes, the document's spec is replaced by the canonical one
//! (keeping the raw signature) whether or not reconciliation succeeds.

use tracing::{debug, info, warn};

use crate::crypto::{verify_signature, verify_signature_pem};
use crate::error::{EnvelopeStage, LicenseError, LicenseResult};
use crate::keys::KeyRegistry;
use crate::reconcile::{diff_specs, SpecFields};
use crate::schema::{SignedEntitlement, SignedLicense};
use crate::signature::{decode_license_signature, AppSigningKeys, KeySignature};

/// Verifies licenses of either generation against a set of trusted keys.
#[derive(Debug, Clone)]
pub struct LicenseValidator {
    registry: KeyRegistry,
}

impl Default for LicenseValidator {
    fn default() -> Self {
        Self::global()
    }
}

impl LicenseValidator {
    pub fn new(registry: KeyRegistry) -> Self {
        Self { registry }
    }

    /// Validator over the built-in keys and the current process-wide override.
    pub fn global() -> Self {
        Self::new(KeyRegistry::global())
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Verify `license` and return the issuer key.
    ///
    /// On success, and on a reconciliation failure, the license spec holds
    /// the canonical signed values afterwards.
    pub fn validate<L: SignedLicense>(&self, license: &mut L) -> LicenseResult<AppSigningKeys> {
        let schema = L::SCHEMA;
        let hash = schema.hash_algorithm();

        let decoded = decode_license_signature(license.raw_signature())?;

        let key_signature = decoded
            .inner
            .key_signature_for(schema)
            .ok_or_else(|| {
                warn!(schema = %schema, "license has no key signature for its schema");
                LicenseError::SignatureMissing {
                    schema,
                    what: "key signature",
                }
            })?;
        let key_signature = KeySignature::from_json(key_signature)?;

        let global_key = self.registry.find_global_key(&key_signature.global_key_id)?;
        verify_signature_pem(
            decoded.inner.public_key.as_bytes(),
            &key_signature.signature,
            global_key,
            hash,
        )
        .map_err(|e| {
            warn!(schema = %schema, global_key_id = %key_signature.global_key_id, error = %e, "key signature rejected");
            LicenseError::KeySignatureInvalid {
                schema,
                reason: reason_of(e),
            }
        })?;
        debug!(global_key_id = %key_signature.global_key_id, "issuer key signature verified");

        let license_signature = decoded
            .inner
            .license_signature_for(schema)
            .ok_or_else(|| {
                warn!(schema = %schema, "license has no license signature for its schema");
                LicenseError::SignatureMissing {
                    schema,
                    what: "license signature",
                }
            })?;
        verify_signature(
            &decoded.outer.license_data,
            license_signature,
            decoded.app_keys.public_key(),
            hash,
        )
        .map_err(|e| {
            warn!(schema = %schema, error = %e, "license signature rejected");
            LicenseError::LicenseSignatureInvalid {
                schema,
                reason: reason_of(e),
            }
        })?;
        debug!("license data signature verified");

        let signed: L = serde_json::from_slice(&decoded.outer.license_data).map_err(|e| {
            LicenseError::EnvelopeDecode {
                stage: EnvelopeStage::LicenseData,
                reason: e.to_string(),
            }
        })?;
        let reconciled = diff_specs(license.spec(), signed.spec());
        license.adopt_signed_spec(signed);
        if let Err(mismatch) = reconciled {
            warn!(
                field = %mismatch.field,
                actual = %mismatch.actual,
                signed = %mismatch.signed,
                "license differs from signed license data"
            );
            return Err(mismatch.into());
        }

        for (name, field) in license.spec().entitlements() {
            if field.signature_bytes().is_none() {
                debug!(entitlement = %name, "entitlement is unsigned, skipping");
                continue;
            }
            verify_entitlement(name, field, &decoded.app_keys)?;
        }

        info!(
            schema = %schema,
            license_id = %license.license_id(),
            app_slug = %license.app_slug(),
            "license signature verified"
        );
        Ok(decoded.app_keys)
    }
}

/// Verify a single entitlement's signature over its rendered value.
pub fn verify_entitlement<E: SignedEntitlement>(
    name: &str,
    field: &E,
    app_keys: &AppSigningKeys,
) -> LicenseResult<()> {
    let signature = field
        .signature_bytes()
        .ok_or_else(|| LicenseError::EntitlementSignatureMissing {
            field: name.to_string(),
        })?;

    verify_signature(
        field.signing_message().as_bytes(),
        signature,
        app_keys.public_key(),
        E::SCHEMA.hash_algorithm(),
    )
    .map_err(|e| {
        warn!(entitlement = %name, error = %e, "entitlement signature rejected");
        LicenseError::EntitlementSignatureInvalid {
            field: name.to_string(),
            reason: reason_of(e),
        }
    })
}

fn reason_of(err: LicenseError) -> String {
    match err {
        LicenseError::SignatureInvalid { reason } | LicenseError::KeyParse { reason } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaVersion;
    use crate::v1beta1;
    use crate::value::{EntitlementValue, FieldValue};

    const V1_YAML: &str = include_str!("../tests/fixtures/v1beta1-signed.yaml");
    const V1_GLOBAL_KEY: &str = include_str!("../tests/fixtures/v1beta1-global-key.pem");
    const V2_GLOBAL_KEY: &str = include_str!("../tests/fixtures/v1beta2-global-key.pem");

    fn validator(pem: &str) -> LicenseValidator {
        LicenseValidator::new(KeyRegistry::with_override(pem).unwrap())
    }

    fn v1_license() -> v1beta1::License {
        serde_yaml::from_str(V1_YAML).unwrap()
    }

    #[test]
    fn test_validate_v1_fixture() {
        let mut license = v1_license();
        let keys = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap();

        let field = &license.spec.entitlements["int_default_0_set_587"];
        verify_entitlement("int_default_0_set_587", field, &keys).unwrap();
    }

    #[test]
    fn test_untrusted_global_key_id() {
        let mut license = v1_license();
        let err = LicenseValidator::new(KeyRegistry::builtin())
            .validate(&mut license)
            .unwrap_err();
        assert!(matches!(err, LicenseError::GlobalKeyNotFound { ref key_id } if key_id == "test-global-key-id"));
    }

    #[test]
    fn test_wrong_global_key() {
        let mut license = v1_license();
        let err = validator(V2_GLOBAL_KEY).validate(&mut license).unwrap_err();
        assert!(matches!(
            err,
            LicenseError::KeySignatureInvalid {
                schema: SchemaVersion::V1Beta1,
                ..
            }
        ));
    }

    #[test]
    fn test_entitlement_without_signature() {
        let mut license = v1_license();
        let keys = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap();
        let field = v1beta1::EntitlementField {
            value: FieldValue::Present(EntitlementValue::Int(1)),
            ..Default::default()
        };
        let err = verify_entitlement("seats", &field, &keys).unwrap_err();
        assert!(matches!(err, LicenseError::EntitlementSignatureMissing { ref field } if field == "seats"));
    }

    #[test]
    fn test_mutated_entitlement_fails() {
        let mut license = v1_license();
        let keys = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap();

        let mut field = license.spec.entitlements["int_default_0_set_587"].clone();
        field.value = FieldValue::Present(EntitlementValue::Int(33));
        let err = verify_entitlement("int_default_0_set_587", &field, &keys).unwrap_err();
        assert!(matches!(
            err,
            LicenseError::EntitlementSignatureInvalid { ref field, .. } if field == "int_default_0_set_587"
        ));
    }

    #[test]
    fn test_reason_of_unwraps_signature_errors() {
        assert_eq!(
            reason_of(LicenseError::SignatureInvalid {
                reason: "hash mismatch".to_string()
            }),
            "hash mismatch"
        );
        assert_eq!(
            reason_of(LicenseError::GlobalKeyNotFound {
                key_id: "x".to_string()
            }),
            "global public key not found for key ID: x"
        );
    }
}
