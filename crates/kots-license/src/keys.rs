//! Trusted global keys.
//!
//! Issuer keys embedded in a license are only trusted when one of the global
//! keys signed them. The global keys are compiled in, one per distribution
//! environment. A single override key can replace all of them for alternate
//! trust roots and test fixtures.
//!
//! # Override lifecycle
//!
//! Prefer building a [`KeyRegistry`] explicitly (see
//! [`KeyRegistry::from_config`]) and handing it to a
//! [`LicenseValidator`](crate::LicenseValidator). The process-wide override
//! set through [`set_custom_public_key`] exists for callers that cannot thread
//! a registry through. Install it once at startup, before any verification
//! runs; validators snapshot it when they are created.

use std::sync::RwLock;

use rsa::pkcs8::{EncodePublicKey, LineEnding};
use tracing::{debug, warn};

use crate::config::LicenseConfig;
use crate::crypto::parse_public_key_pem;
use crate::error::{LicenseError, LicenseResult};

/// Built-in global key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalKey {
    /// Key ID referenced by `globalKeyId` in key signatures.
    pub key_id: &'static str,
    /// Distribution environment the key belongs to.
    pub environment: &'static str,
    /// PKIX public key, PEM-encoded.
    pub public_key_pem: &'static str,
}

/// Global keys compiled into the binary.
pub const BUILTIN_GLOBAL_KEYS: &[GlobalKey] = &[
    GlobalKey {
        key_id: "1d3f7f6b50714fe7b895554dd65773b0",
        environment: "development",
        public_key_pem: "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAugyKfZV2gIDaY1Rzkjoo
fbNywGa04sGQIAqYwifMay2e2xzqRwswTRHQnr9SIWypkN86Cfn6QzOB8kkjERC1
DPNdsiKdjBFdcLaxxdyHgrXLgfdzhh6We+Lpq19JT5LCK3PXleZgt/a0aRBpIc1l
xKs57d8MTWUTVh3W3WYi6LbqAPScdmSiG7A145HhKXmmtZFEv4puE5dKmS5lkV2d
VU789XWrNFk74FKKHVwYMdppqAabB6cRBmU8YFiVEULOn+d1FtKRbO/vv/fbA9nX
PUG/1PgEQHogP+3cC4J7b7s9+kBmtHkpSq9x+OUu/5B+nT21dooS6adfQiI8iB/+
NQIDAQAB
-----END PUBLIC KEY-----",
    },
    GlobalKey {
        key_id: "bdee56560cfb43c9b28bf98eacafa646",
        environment: "production",
        public_key_pem: "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAwdSHE8v64QH/yELBoPBl
GanhS3AD5vMAaqLLFnftwjmDKrxWwqNB9w1GVJWb5gVLvt/UlE/k+HVr5HFdomVI
TMvnvxhD0UvNyGFuUbXBMvQPPW9joR48LcCBLZl+RZTqR5HRhsIbujiExRDnteaq
mU1jG/oVlQkRoyOYrObTeoD0BdcZAr2PdGvgvJvpZduZtrKvjvsSJEBYExoPtko+
8AqhMBAI+qX1/SMix21qpmYSYLNeqN2Pplna0p2MK8yyaHY8KSqTF90ZJF1+P0ZF
MLt6S8/6PIX9WD+vFqmDpW1GCkB+p2OfxsYiAIX1ej98Ck3hoPQnOuiFIovV8aFQ
bQIDAQAB
-----END PUBLIC KEY-----",
    },
    GlobalKey {
        key_id: "de2c275656d04b1bb0f15cf70f0ea2a2",
        environment: "staging",
        public_key_pem: "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA2hHg1HER6NYlsqBs+B+B
txibtctT6YB5kxgE1sz7UmVnlcLs+Olc4OZJwD4vLsEU60SVW0HRoTfaGaradv0R
GUIxlFRSOnzjZEMkm/YKL3sdPQigi2m9O0P5tC9LQvzk49dFg5HJxiLODCgWwJ9g
q3pGs8OaAc0dop/tqUE7WqQfHLWJdTPP5pVDLDWybfAO4OmgVmx+oVXdCfMVlOzu
num6SOF+eBuERXQGbEfnd6eSRVokWhfMCfXNPTYtq14DaK9tvX4uzHsub+Asn6UN
OBIAESJntpZfdDDrNqbfOQYql2rqx1lJtU7lVFbTQTkKhj4teInEGO6FvLzy0UE9
swIDAQAB
-----END PUBLIC KEY-----",
    },
];

/// Process-wide override key, canonical PEM.
static CUSTOM_PUBLIC_KEY: RwLock<Option<String>> = RwLock::new(None);

/// Resolves `globalKeyId` values to trusted public keys.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    override_pem: Option<String>,
}

impl KeyRegistry {
    /// Registry holding only the built-in keys.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Registry whose single override key replaces every built-in key.
    pub fn with_override(public_key_pem: &str) -> LicenseResult<Self> {
        Ok(Self {
            override_pem: Some(canonical_pem(public_key_pem)?),
        })
    }

    /// Registry built from configuration.
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        match config.resolve_custom_public_key()? {
            Some(pem) => Self::with_override(&pem),
            None => Ok(Self::builtin()),
        }
    }

    /// Snapshot of the built-in keys plus the current process-wide override.
    pub fn global() -> Self {
        let override_pem = match CUSTOM_PUBLIC_KEY.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Self { override_pem }
    }

    /// Install an override key on this registry.
    pub fn set_override(&mut self, public_key_pem: &str) -> LicenseResult<()> {
        self.override_pem = Some(canonical_pem(public_key_pem)?);
        Ok(())
    }

    /// Remove the override key, reverting to the built-in keys.
    pub fn clear_override(&mut self) {
        self.override_pem = None;
    }

    /// Whether an override key is installed.
    pub fn has_override(&self) -> bool {
        self.override_pem.is_some()
    }

    /// PEM of the global key for `key_id`.
    ///
    /// The override key, when installed, is returned for every id.
    pub fn find_global_key(&self, key_id: &str) -> LicenseResult<&str> {
        if let Some(pem) = &self.override_pem {
            warn!(key_id = %key_id, "using custom public key instead of built-in global key");
            return Ok(pem.as_str());
        }

        BUILTIN_GLOBAL_KEYS
            .iter()
            .find(|key| key.key_id == key_id)
            .map(|key| {
                debug!(key_id = %key_id, environment = key.environment, "resolved global key");
                key.public_key_pem
            })
            .ok_or_else(|| LicenseError::GlobalKeyNotFound {
                key_id: key_id.to_string(),
            })
    }

    /// IDs and environments of the built-in keys.
    pub fn builtin_key_ids() -> impl Iterator<Item = (&'static str, &'static str)> {
        BUILTIN_GLOBAL_KEYS
            .iter()
            .map(|key| (key.key_id, key.environment))
    }
}

/// Install a process-wide override key.
///
/// Must happen before verification starts; see the module docs.
pub fn set_custom_public_key(public_key_pem: &str) -> LicenseResult<()> {
    let pem = canonical_pem(public_key_pem)?;
    match CUSTOM_PUBLIC_KEY.write() {
        Ok(mut guard) => *guard = Some(pem),
        Err(poisoned) => *poisoned.into_inner() = Some(pem),
    }
    Ok(())
}

/// Clear the process-wide override key.
pub fn reset_custom_public_key() {
    match CUSTOM_PUBLIC_KEY.write() {
        Ok(mut guard) => *guard = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}

/// Validate an RSA public key PEM and re-encode it canonically.
fn canonical_pem(public_key_pem: &str) -> LicenseResult<String> {
    let key = parse_public_key_pem(public_key_pem)?;
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| LicenseError::KeyParse {
            reason: format!("failed to marshal custom public key: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TEST_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQCwt6wQ09x3XLcf1+B4MsxNHn1n
81ySKMA8cYQo1gdXfhSTaJ3Iu1FxRB7zWDzoTG2Dn9BwyZzKJFRAxdJvL1R66bxw
gjV0NPt1s9LM59/MtMPAyxDWbuiNZr1cWpeTB881X/GHEj7xT9uNyP4YZuil6p+g
5BNBDyPiEeXAw9i26QIDAQAB
-----END PUBLIC KEY-----";

    #[test]
    fn test_builtin_keys_parse() {
        for key in BUILTIN_GLOBAL_KEYS {
            let parsed = parse_public_key_pem(key.public_key_pem)
                .unwrap_or_else(|e| panic!("{} key invalid: {}", key.environment, e));
            assert_eq!(rsa::traits::PublicKeyParts::size(&parsed), 256);
        }
        let environments: Vec<_> = KeyRegistry::builtin_key_ids().map(|(_, env)| env).collect();
        assert_eq!(environments, vec!["development", "production", "staging"]);
    }

    #[test]
    fn test_find_builtin_key() {
        let registry = KeyRegistry::builtin();
        let pem = registry
            .find_global_key("bdee56560cfb43c9b28bf98eacafa646")
            .unwrap();
        assert!(pem.contains("MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAwdSHE8v64QH"));
    }

    #[test]
    fn test_unknown_key_id() {
        let err = KeyRegistry::builtin()
            .find_global_key("test-global-key-id")
            .unwrap_err();
        assert!(matches!(err, LicenseError::GlobalKeyNotFound { ref key_id } if key_id == "test-global-key-id"));
    }

    #[test]
    fn test_override_wins_for_any_id() {
        let mut registry = KeyRegistry::with_override(TEST_KEY).unwrap();
        assert!(registry.has_override());
        for id in ["1d3f7f6b50714fe7b895554dd65773b0", "anything"] {
            let pem = registry.find_global_key(id).unwrap();
            assert_eq!(pem.trim(), TEST_KEY);
        }

        registry.clear_override();
        assert!(registry.find_global_key("anything").is_err());
    }

    #[test]
    fn test_override_rejects_bad_pem() {
        let mut registry = KeyRegistry::builtin();
        assert!(registry.set_override("garbage").is_err());
        assert!(!registry.has_override());
    }

    #[test]
    #[serial]
    fn test_global_override_lifecycle() {
        reset_custom_public_key();
        assert!(!KeyRegistry::global().has_override());

        set_custom_public_key(TEST_KEY).unwrap();
        let snapshot = KeyRegistry::global();
        assert!(snapshot.has_override());

        reset_custom_public_key();
        assert!(!KeyRegistry::global().has_override());
        // Snapshots are unaffected by later changes.
        assert!(snapshot.has_override());
    }

    #[test]
    #[serial]
    fn test_global_override_rejects_bad_pem() {
        reset_custom_public_key();
        assert!(set_custom_public_key("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
        assert!(!KeyRegistry::global().has_override());
    }
}
