//! Verification configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};
use crate::keys;

/// Environment variable holding an override public key (PEM text or a path to a PEM file).
pub const PUBLIC_KEY_ENV: &str = "KOTS_LICENSE_PUBLIC_KEY";

/// License verification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Override public key replacing the built-in global keys.
    ///
    /// Either PEM text or a path to a PEM file.
    pub custom_public_key: Option<String>,
}

impl LicenseConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            custom_public_key: std::env::var(PUBLIC_KEY_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Set the override public key.
    pub fn with_custom_public_key(mut self, key: impl Into<String>) -> Self {
        self.custom_public_key = Some(key.into());
        self
    }

    /// Override key as PEM text, reading it from disk when a path was configured.
    pub fn resolve_custom_public_key(&self) -> LicenseResult<Option<String>> {
        let Some(value) = &self.custom_public_key else {
            return Ok(None);
        };
        if value.contains("-----BEGIN") {
            return Ok(Some(value.clone()));
        }

        let path = PathBuf::from(value.trim());
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| LicenseError::Io {
                what: "public key file",
                path,
                source,
            })
    }

    /// Install the configured override key process-wide, or clear it when none is configured.
    pub fn install_global(&self) -> LicenseResult<()> {
        match self.resolve_custom_public_key()? {
            Some(pem) => keys::set_custom_public_key(&pem),
            None => {
                keys::reset_custom_public_key();
                Ok(())
            }
        }
    }
}
