//! Signature verification for signed `kots.io` License documents.
//!
//! A License is issued by a central authority and verified offline. This
//! crate provides:
//!
//! - Decoding of both schema generations (`v1beta1` and `v1beta2`)
//! - The two-layer signature chain: global key → issuer key → license data
//! - Reconciliation of the document against its signed license data
//! - Per-entitlement signature checks
//! - Version-agnostic access through [`LicenseWrapper`]
//!
//! # Quick Start
//!
//! ```no_run
//! use kots_license::load_license_from_path;
//!
//! # fn example() -> kots_license::LicenseResult<()> {
//! let mut license = load_license_from_path("license.yaml")?;
//! let app_keys = license.verify_signature()?;
//!
//! for (name, field) in license.entitlements() {
//!     field.verify_signature(&app_keys)?;
//!     println!("{} = {}", name, field.value());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Trusted keys
//!
//! Issuer keys are trusted when one of the built-in global keys signed them.
//! A single override key replaces all of them, either per validator through
//! [`KeyRegistry::with_override`] or process-wide through
//! [`set_custom_public_key`].
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `KOTS_LICENSE_PUBLIC_KEY` | Override global key, as PEM text or a path to a PEM file |

mod b64;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod meta;
pub mod reconcile;
pub mod schema;
pub mod signature;
pub mod v1beta1;
pub mod v1beta2;
pub mod validate;
pub mod value;
pub mod wrapper;

// Re-export main types
pub use config::{LicenseConfig, PUBLIC_KEY_ENV};
pub use crypto::{verify_signature, verify_signature_pem, HashAlgorithm};
pub use error::{EnvelopeStage, LicenseDataMismatch, LicenseError, LicenseResult};
pub use keys::{reset_custom_public_key, set_custom_public_key, GlobalKey, KeyRegistry};
pub use schema::{SchemaVersion, SignedEntitlement, SignedLicense};
pub use signature::{decode_license_signature, AppSigningKeys};
pub use validate::{verify_entitlement, LicenseValidator};
pub use value::{EntitlementValue, FieldValue, ValueKind};
pub use wrapper::{
    load_license_from_bytes, load_license_from_path, EntitlementFieldWrapper, LicenseWrapper,
};
