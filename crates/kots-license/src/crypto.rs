//! RSA-PSS signature verification.
//!
//! Issuers sign with RSA-PSS and whatever salt length their signer picked
//! (in practice the maximum). Verification therefore recovers the salt
//! length from the encoded message instead of fixing it up front, so
//! EMSA-PSS-VERIFY (RFC 8017 §9.1.2) is implemented here on top of the
//! raw RSA public operation.

use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha2::Digest;

use crate::error::{LicenseError, LicenseResult};

/// Trailer byte of every PSS encoded message.
const PSS_TRAILER: u8 = 0xbc;

/// Digest algorithm applied to a message before PSS verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha256 => 32,
        }
    }

    /// Hash `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Md5 => md5::compute(data).0.to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
        }
    }
}

/// Parse a PEM-encoded PKIX (`PUBLIC KEY`) RSA public key.
///
/// Text before the first `-----BEGIN` line and after the matching `-----END`
/// line is ignored.
pub fn parse_public_key_pem(pem: &str) -> LicenseResult<RsaPublicKey> {
    let block = pem_block(pem).ok_or_else(|| LicenseError::KeyParse {
        reason: "failed to decode PEM block".to_string(),
    })?;

    RsaPublicKey::from_public_key_pem(block).map_err(|e| LicenseError::KeyParse {
        reason: format!("not a PKIX RSA public key: {}", e),
    })
}

/// First `-----BEGIN …-----` through `-----END …-----` block of `text`.
fn pem_block(text: &str) -> Option<&str> {
    const BEGIN: &str = "-----BEGIN";
    const END: &str = "-----END";
    const DASHES: &str = "-----";

    let block = &text[text.find(BEGIN)?..];
    let Some(end) = block.find(END) else {
        return Some(block.trim_end());
    };
    let label_start = end + END.len();
    match block[label_start..].find(DASHES) {
        Some(close) => Some(&block[..label_start + close + DASHES.len()]),
        None => Some(block.trim_end()),
    }
}

/// Verify an RSA-PSS signature over `message` with an already parsed key.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    public_key: &RsaPublicKey,
    hash: HashAlgorithm,
) -> LicenseResult<()> {
    let digest = hash.digest(message);
    let encoded = rsa_public_op(public_key, signature)?;
    // emBits = modBits - 1
    let em_bits = public_key.n().bits() - 1;
    emsa_pss_verify(&digest, &encoded, em_bits, hash)
}

/// Verify an RSA-PSS signature over `message` with a PEM-encoded key.
pub fn verify_signature_pem(
    message: &[u8],
    signature: &[u8],
    public_key_pem: &str,
    hash: HashAlgorithm,
) -> LicenseResult<()> {
    let public_key = parse_public_key_pem(public_key_pem)?;
    verify_signature(message, signature, &public_key, hash)
}

fn invalid(reason: impl Into<String>) -> LicenseError {
    LicenseError::SignatureInvalid {
        reason: reason.into(),
    }
}

/// RSAVP1: `s^e mod n`, left-padded to the modulus length.
fn rsa_public_op(public_key: &RsaPublicKey, signature: &[u8]) -> LicenseResult<Vec<u8>> {
    let k = public_key.size();
    if signature.len() != k {
        return Err(invalid(format!(
            "signature is {} bytes, expected {}",
            signature.len(),
            k
        )));
    }

    let s = BigUint::from_bytes_be(signature);
    if &s >= public_key.n() {
        return Err(invalid("signature representative out of range"));
    }

    let m = s.modpow(public_key.e(), public_key.n()).to_bytes_be();
    let mut encoded = vec![0u8; k - m.len()];
    encoded.extend_from_slice(&m);
    Ok(encoded)
}

fn emsa_pss_verify(
    m_hash: &[u8],
    encoded: &[u8],
    em_bits: usize,
    hash: HashAlgorithm,
) -> LicenseResult<()> {
    let em_len = em_bits.div_ceil(8);
    let h_len = hash.output_len();

    // A modulus of 8n+1 bits leaves one leading zero octet outside EM.
    let (prefix, em) = encoded.split_at(encoded.len() - em_len);
    if prefix.iter().any(|&b| b != 0) {
        return Err(invalid("encoded message too long"));
    }
    if em_len < h_len + 2 {
        return Err(invalid("encoded message too short"));
    }
    if em[em_len - 1] != PSS_TRAILER {
        return Err(invalid("bad trailer"));
    }

    let (masked_db, rest) = em.split_at(em_len - h_len - 1);
    let h = &rest[..h_len];

    let top_mask = 0xffu8 >> (8 * em_len - em_bits);
    if masked_db[0] & !top_mask != 0 {
        return Err(invalid("leftmost bits not zero"));
    }

    let mut db = masked_db.to_vec();
    mgf1_xor(&mut db, h, hash);
    db[0] &= top_mask;

    // DB = PS || 0x01 || salt, PS all zero. Salt length is whatever remains.
    let separator = db
        .iter()
        .position(|&b| b != 0)
        .ok_or_else(|| invalid("missing salt separator"))?;
    if db[separator] != 0x01 {
        return Err(invalid("missing salt separator"));
    }
    let salt = &db[separator + 1..];

    let mut m_prime = Vec::with_capacity(8 + h_len + salt.len());
    m_prime.extend_from_slice(&[0u8; 8]);
    m_prime.extend_from_slice(m_hash);
    m_prime.extend_from_slice(salt);

    if hash.digest(&m_prime) != h {
        return Err(invalid("hash mismatch"));
    }

    Ok(())
}

/// XOR `out` with MGF1(seed, out.len()).
fn mgf1_xor(out: &mut [u8], seed: &[u8], hash: HashAlgorithm) {
    let mut input = Vec::with_capacity(seed.len() + 4);
    let mut counter: u32 = 0;
    let mut offset = 0;

    while offset < out.len() {
        input.clear();
        input.extend_from_slice(seed);
        input.extend_from_slice(&counter.to_be_bytes());
        let block = hash.digest(&input);

        for (o, m) in out[offset..].iter_mut().zip(block.iter()) {
            *o ^= m;
        }
        offset += block.len();
        counter += 1;
    }
}
