//! Integration tests for the license signature chain.
//!
//! Uses the signed fixtures under `tests/fixtures/`. Tests cover valid chains for
//! both generations, entitlement tampering, absent entitlement values,
//! reconciliation repair, generation isolation, and envelope tampering.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use kots_license::{
    load_license_from_bytes, reset_custom_public_key, set_custom_public_key, v1beta1, v1beta2,
    EntitlementValue, EnvelopeStage, FieldValue, KeyRegistry, LicenseError, LicenseValidator,
    LicenseWrapper, SchemaVersion,
};
use serde_json::Value;
use serial_test::serial;

const V1_YAML: &str = include_str!("fixtures/v1beta1-signed.yaml");
const V2_YAML: &str = include_str!("fixtures/v1beta2-signed.yaml");
const V1_GLOBAL_KEY: &str = include_str!("fixtures/v1beta1-global-key.pem");
const V2_GLOBAL_KEY: &str = include_str!("fixtures/v1beta2-global-key.pem");
const ABSENT_JSON: &str = include_str!("fixtures/v1beta1-absent-value.json");
const ABSENT_GLOBAL_KEY: &str = include_str!("fixtures/absent-value-global-key.pem");

fn validator(global_key: &str) -> LicenseValidator {
    LicenseValidator::new(KeyRegistry::with_override(global_key).expect("valid global key"))
}

fn v1_license() -> v1beta1::License {
    serde_yaml::from_str(V1_YAML).expect("v1beta1 fixture")
}

fn v2_license() -> v1beta2::License {
    serde_yaml::from_str(V2_YAML).expect("v1beta2 fixture")
}

/// Rewrite the JSON layers of a raw signature envelope.
fn rewrite_envelope(signature: &[u8], edit: impl FnOnce(&mut Value, &mut Value)) -> Vec<u8> {
    let mut outer: Value = serde_json::from_slice(signature).unwrap();
    let inner_b64 = outer["innerSignature"].as_str().unwrap().to_string();
    let mut inner: Value = serde_json::from_slice(&BASE64.decode(inner_b64).unwrap()).unwrap();

    edit(&mut outer, &mut inner);

    outer["innerSignature"] = Value::String(BASE64.encode(serde_json::to_vec(&inner).unwrap()));
    serde_json::to_vec(&outer).unwrap()
}

/// Flip one byte of a base64 field.
fn corrupt_b64(field: &mut Value) {
    let mut bytes = BASE64.decode(field.as_str().unwrap()).unwrap();
    bytes[10] ^= 0xff;
    *field = Value::String(BASE64.encode(bytes));
}

// ============================================================
// Scenario A: valid chain, then entitlement tampering
// ============================================================

#[test]
fn test_v1_chain_and_entitlements() {
    let mut license = load_license_from_bytes(V1_YAML.as_bytes()).unwrap();
    let app_keys = license
        .verify_signature_with(&validator(V1_GLOBAL_KEY))
        .expect("v1beta1 fixture should verify");

    let entitlements = license.entitlements();
    assert_eq!(entitlements.len(), 4);
    for (name, field) in &entitlements {
        field
            .verify_signature(&app_keys)
            .unwrap_or_else(|e| panic!("entitlement {} should verify: {}", name, e));
    }

    let mut field = license.as_v1().unwrap().spec.entitlements["int_default_0_set_587"].clone();
    field.value = EntitlementValue::Int(33).into();
    let err = field
        .validate_signature("int_default_0_set_587", &app_keys)
        .unwrap_err();
    assert!(matches!(err, LicenseError::EntitlementSignatureInvalid { .. }));
}

#[test]
fn test_v2_chain_and_entitlements() {
    let mut license = load_license_from_bytes(V2_YAML.as_bytes()).unwrap();
    let app_keys = license
        .verify_signature_with(&validator(V2_GLOBAL_KEY))
        .expect("v1beta2 fixture should verify");

    for (_, field) in license.entitlements() {
        field.verify_signature(&app_keys).unwrap();
    }

    let mut field = license.as_v2().unwrap().spec.entitlements["int_default_0_set_587"].clone();
    field.value = EntitlementValue::Int(33);
    let err = field
        .validate_signature("int_default_0_set_587", &app_keys)
        .unwrap_err();
    assert!(matches!(
        err,
        LicenseError::EntitlementSignatureInvalid { ref field, .. } if field == "int_default_0_set_587"
    ));
}

#[test]
fn test_entitlement_type_change_breaks_signature() {
    let mut license = v2_license();
    let app_keys = validator(V2_GLOBAL_KEY).validate(&mut license).unwrap();

    let mut field = license.spec.entitlements["int_default_0_set_587"].clone();
    field.value = EntitlementValue::String("587".to_string());
    // Same text, so the signature still matches: only the text is signed.
    field
        .validate_signature("int_default_0_set_587", &app_keys)
        .unwrap();

    field.value = EntitlementValue::Bool(true);
    assert!(field
        .validate_signature("int_default_0_set_587", &app_keys)
        .is_err());
}

#[test]
fn test_entitlement_signed_under_other_generation_is_rejected() {
    let mut v1 = v1_license();
    let v1_keys = validator(V1_GLOBAL_KEY).validate(&mut v1).unwrap();

    // A v1 (MD5) entitlement signature carried in a v2 field is checked with SHA-256.
    let v1_field = &v1.spec.entitlements["int_default_0_set_587"];
    let forged = v1beta2::EntitlementField {
        value: EntitlementValue::Int(587),
        signature: Some(v1beta2::EntitlementFieldSignature {
            v2: v1_field.signature.clone().unwrap().v1,
        }),
        ..Default::default()
    };
    assert!(forged
        .validate_signature("int_default_0_set_587", &v1_keys)
        .is_err());
}

// ============================================================
// Scenario B: absent entitlement value
// ============================================================

#[test]
fn test_absent_value_entitlement() {
    let mut license = load_license_from_bytes(ABSENT_JSON.as_bytes()).unwrap();
    assert!(license.is_v1());
    let app_keys = license
        .verify_signature_with(&validator(ABSENT_GLOBAL_KEY))
        .expect("unsigned entitlements are skipped by the chain");

    assert_eq!(license.app_slug(), "absent-app");
    assert_eq!(license.license_sequence(), 7);
    assert!(license.is_airgap_supported());

    let no_value = license.entitlement("no_value").unwrap();
    assert_eq!(no_value.value(), FieldValue::Absent);
    assert_eq!(no_value.value().to_string(), "<nil>");
    no_value.verify_signature(&app_keys).unwrap();

    let seats = license.entitlement("seats").unwrap();
    assert_eq!(seats.value(), FieldValue::Present(EntitlementValue::Int(10)));
    seats.verify_signature(&app_keys).unwrap();

    let legacy = license.entitlement("legacy_unsigned").unwrap();
    assert!(legacy.signature().is_none());
    let err = legacy.verify_signature(&app_keys).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::EntitlementSignatureMissing { ref field } if field == "legacy_unsigned"
    ));
}

#[test]
fn test_absent_value_is_not_empty_string() {
    let mut license: v1beta1::License = serde_json::from_str(ABSENT_JSON).unwrap();
    let app_keys = validator(ABSENT_GLOBAL_KEY).validate(&mut license).unwrap();

    let mut field = license.spec.entitlements["no_value"].clone();
    field.value = EntitlementValue::String(String::new()).into();
    assert!(field.validate_signature("no_value", &app_keys).is_err());
}

#[test]
fn test_absent_value_added_on_disk_fails_reconciliation() {
    let mut license: v1beta1::License = serde_json::from_str(ABSENT_JSON).unwrap();
    license
        .spec
        .entitlements
        .get_mut("no_value")
        .unwrap()
        .value = EntitlementValue::String("filled".to_string()).into();

    let err = validator(ABSENT_GLOBAL_KEY)
        .validate(&mut license)
        .unwrap_err();
    let mismatch = err.data_mismatch().expect("data mismatch");
    assert_eq!(mismatch.field, "entitlements[no_value].value.type");
    assert_eq!(mismatch.actual, "String");
    assert_eq!(mismatch.signed, "<nil>");
    assert!(license.spec.entitlements["no_value"].value.is_absent());
}

// ============================================================
// Scenario C: reconciliation repairs and fails
// ============================================================

#[test]
fn test_changed_app_slug_is_repaired() {
    let mut license = v1_license();
    let original_signature = license.spec.signature.clone();
    license.spec.app_slug = "changed".to_string();

    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(err.is_data_mismatch());
    assert_eq!(
        err.to_string(),
        "license data validation error: appSlug field has changed to \"changed\" (license) from \"test-app\" (within signature)"
    );

    assert_eq!(license.spec.app_slug, "test-app");
    assert_eq!(license.spec.signature, original_signature);

    // The repaired document verifies.
    validator(V1_GLOBAL_KEY).validate(&mut license).unwrap();
}

#[test]
fn test_changed_spec_fields_through_wrapper() {
    let mut document = v2_license();
    document.spec.is_airgap_supported = true;
    let mut license = LicenseWrapper::from(document);

    let err = license
        .verify_signature_with(&validator(V2_GLOBAL_KEY))
        .unwrap_err();
    let mismatch = err.data_mismatch().unwrap();
    assert_eq!(mismatch.field, "isAirgapSupported");
    assert_eq!((mismatch.actual.as_str(), mismatch.signed.as_str()), ("true", "false"));
    assert!(!license.is_airgap_supported());
}

#[test]
fn test_changed_channel_and_entitlement_count() {
    let mut license = v1_license();
    license.spec.channels[0].channel_name = "Beta".to_string();
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert_eq!(err.data_mismatch().unwrap().field, "channels[0].channelName");

    let mut license = v1_license();
    license.spec.entitlements.remove("expires_at");
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    let mismatch = err.data_mismatch().unwrap();
    assert_eq!(mismatch.field, "entitlements length");
    assert_eq!((mismatch.actual.as_str(), mismatch.signed.as_str()), ("3", "4"));
    assert_eq!(license.spec.entitlements.len(), 4);
}

#[test]
fn test_metadata_is_not_signed() {
    let mut license = v1_license();
    license.metadata.name = "changed".to_string();
    validator(V1_GLOBAL_KEY).validate(&mut license).unwrap();
    assert_eq!(license.metadata.name, "changed");
}

// ============================================================
// Scenario D: foreign documents
// ============================================================

#[test]
fn test_foreign_group_kind_rejected() {
    for yaml in [
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n",
        "apiVersion: kots.io/v1beta1\nkind: Application\n",
        "apiVersion: troubleshoot.sh/v1beta2\nkind: License\n",
    ] {
        let err = load_license_from_bytes(yaml.as_bytes()).unwrap_err();
        assert!(
            matches!(err, LicenseError::UnsupportedSchema { .. }),
            "{} should be rejected, got {}",
            yaml,
            err
        );
    }
}

// ============================================================
// Generation isolation
// ============================================================

#[test]
fn test_v2_envelope_on_v1_document() {
    let mut license = v1_license();
    license.spec.signature = v2_license().spec.signature;

    let err = validator(V2_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::SignatureMissing {
            schema: SchemaVersion::V1Beta1,
            what: "key signature"
        }
    ));
    assert_eq!(err.to_string(), "v1beta1 key signature not found");
}

#[test]
fn test_v1_envelope_on_v2_document() {
    let mut license = v2_license();
    license.spec.signature = v1_license().spec.signature;

    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::SignatureMissing {
            schema: SchemaVersion::V1Beta2,
            ..
        }
    ));
}

#[test]
fn test_license_signature_missing_for_generation() {
    let mut license = v1_license();
    license.spec.signature = rewrite_envelope(&license.spec.signature, |_, inner| {
        let sig = inner["licenseSignature"].take();
        inner["v2LicenseSignature"] = sig;
        inner.as_object_mut().unwrap().remove("licenseSignature");
    });

    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::SignatureMissing {
            what: "license signature",
            ..
        }
    ));
}

// ============================================================
// Key and envelope tampering
// ============================================================

#[test]
fn test_untrusted_global_key_id() {
    let mut license = v1_license();
    let err = LicenseValidator::new(KeyRegistry::builtin())
        .validate(&mut license)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "global public key not found for key ID: test-global-key-id"
    );
}

#[test]
fn test_wrong_global_key() {
    let mut license = v2_license();
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::KeySignatureInvalid {
            schema: SchemaVersion::V1Beta2,
            ..
        }
    ));
}

#[test]
fn test_substituted_issuer_key() {
    let mut license = v1_license();
    license.spec.signature = rewrite_envelope(&license.spec.signature, |_, inner| {
        inner["publicKey"] = Value::String(V2_GLOBAL_KEY.to_string());
    });

    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(err, LicenseError::KeySignatureInvalid { .. }));
}

#[test]
fn test_corrupted_license_signature() {
    let mut license = v2_license();
    license.spec.signature = rewrite_envelope(&license.spec.signature, |_, inner| {
        corrupt_b64(&mut inner["v2LicenseSignature"]);
    });

    let err = validator(V2_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::LicenseSignatureInvalid {
            schema: SchemaVersion::V1Beta2,
            ..
        }
    ));
    assert!(err.is_signature_error());
}

#[test]
fn test_altered_license_data() {
    let mut license = v1_license();
    let before = license.clone();
    license.spec.signature = rewrite_envelope(&license.spec.signature, |outer, _| {
        let data = BASE64.decode(outer["licenseData"].as_str().unwrap()).unwrap();
        let mut data: Value = serde_json::from_slice(&data).unwrap();
        data["spec"]["appSlug"] = Value::String("other-app".to_string());
        outer["licenseData"] = Value::String(BASE64.encode(serde_json::to_vec(&data).unwrap()));
    });

    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(err, LicenseError::LicenseSignatureInvalid { .. }));
    // Nothing is adopted before the license signature passes.
    assert_eq!(license.spec.app_slug, before.spec.app_slug);
}

#[test]
fn test_malformed_envelope_layers() {
    let mut license = v1_license();
    license.spec.signature = b"not json".to_vec();
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::EnvelopeDecode {
            stage: EnvelopeStage::Outer,
            ..
        }
    ));

    let mut license = v1_license();
    let outer = serde_json::json!({
        "licenseData": BASE64.encode(b"{}"),
        "innerSignature": BASE64.encode(b"not json"),
    });
    license.spec.signature = serde_json::to_vec(&outer).unwrap();
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::EnvelopeDecode {
            stage: EnvelopeStage::Inner,
            ..
        }
    ));

    let mut license = v1_license();
    license.spec.signature = rewrite_envelope(&license.spec.signature, |_, inner| {
        inner["keySignature"] = Value::String(BASE64.encode(b"[]"));
    });
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::EnvelopeDecode {
            stage: EnvelopeStage::KeySignature,
            ..
        }
    ));
}

#[test]
fn test_empty_signature() {
    let mut license = v1_license();
    license.spec.signature.clear();
    let err = validator(V1_GLOBAL_KEY).validate(&mut license).unwrap_err();
    assert!(matches!(err, LicenseError::EnvelopeDecode { .. }));
}

// ============================================================
// Process-wide override key
// ============================================================

#[test]
#[serial]
fn test_global_override_key() {
    set_custom_public_key(V1_GLOBAL_KEY).unwrap();

    let mut license = load_license_from_bytes(V1_YAML.as_bytes()).unwrap();
    let result = license.verify_signature();

    let mut document = v1_license();
    let direct = document.validate_license();

    reset_custom_public_key();
    result.expect("override key should verify the fixture");
    direct.expect("override key should verify the document");

    let mut license = load_license_from_bytes(V1_YAML.as_bytes()).unwrap();
    let err = license.verify_signature().unwrap_err();
    assert!(matches!(err, LicenseError::GlobalKeyNotFound { .. }));
}

#[test]
#[serial]
fn test_validator_snapshots_override() {
    set_custom_public_key(V2_GLOBAL_KEY).unwrap();
    let snapshot = LicenseValidator::global();
    reset_custom_public_key();

    assert!(snapshot.registry().has_override());
    let mut license = v2_license();
    snapshot.validate(&mut license).unwrap();
}
