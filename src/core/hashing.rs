//! Keyed digests for gateway signing and reversible encryption of gateway secrets.
//!
//! Outbound requests are signed with `Base64(H(fields || secret))`. Inbound callbacks name
//! the fields they hashed in `HASHPARAMS`; [`reduce_hash_params`] rebuilds that concatenation
//! from an allow-list only, so a callback cannot smuggle arbitrary fields into the digest.

use crate::{
    entities::HashAlgorithm,
    errors::{Error, Result},
};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Callback fields a bank may list in `HASHPARAMS`.
pub const ALLOWED_HASH_PARAMS: &[&str] = &[
    "clientid",
    "oid",
    "AuthCode",
    "ProcReturnCode",
    "Response",
    "mdStatus",
    "cavv",
    "eci",
    "md",
    "rnd",
    "TransId",
    "ReturnOid",
    "ErrMsg",
];

/// Fields that must be covered by the digest; without them the order id or the outcome
/// could be altered without breaking the signature.
pub const REQUIRED_HASH_PARAMS: &[&str] = &["oid", "ProcReturnCode", "mdStatus"];

const NONCE_LEN: usize = 12;

impl HashAlgorithm {
    /// Computes `Base64(H(data || secret))`.
    #[must_use]
    pub fn digest(self, data: &str, secret: &str) -> String {
        let mut input = String::with_capacity(data.len() + secret.len());
        input.push_str(data);
        input.push_str(secret);

        match self {
            Self::Sha1Base64 => STANDARD.encode(Sha1::digest(input.as_bytes())),
            Self::Sha512Base64 => STANDARD.encode(Sha512::digest(input.as_bytes())),
        }
    }
}

/// Form fields posted back by the bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackFields(BTreeMap<String, String>);

impl CallbackFields {
    /// Returns the value of a field, if the bank sent it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns a non-empty field value.
    #[must_use]
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Rebuilds the concatenation the bank hashed from the names listed in `hash_params`.
///
/// Names are `:`-separated and applied in order; fields absent from the callback contribute
/// nothing. Any name outside [`ALLOWED_HASH_PARAMS`], or a list that omits one of
/// [`REQUIRED_HASH_PARAMS`], is a security failure.
pub fn reduce_hash_params(hash_params: &str, fields: &CallbackFields) -> Result<String> {
    let names: Vec<&str> = hash_params.split(':').filter(|n| !n.is_empty()).collect();

    if let Some(unknown) = names.iter().find(|n| !ALLOWED_HASH_PARAMS.contains(*n)) {
        return Err(Error::Security {
            reason: format!("HASHPARAMS names disallowed field '{unknown}'"),
        });
    }

    if let Some(missing) = REQUIRED_HASH_PARAMS.iter().find(|r| !names.contains(*r)) {
        return Err(Error::Security {
            reason: format!("HASHPARAMS does not cover '{missing}'"),
        });
    }

    Ok(names.iter().fold(String::new(), |mut acc, name| {
        if let Some(value) = fields.get(name) {
            acc.push_str(value);
        }
        acc
    }))
}

/// Authenticates a callback: both the reconstructed concatenation and the recomputed digest
/// must match what the bank sent, byte for byte.
pub fn verify_callback_hash(
    fields: &CallbackFields,
    secret: &str,
    algorithm: HashAlgorithm,
) -> Result<()> {
    let missing = |name: &str| Error::Security {
        reason: format!("callback is missing {name}"),
    };

    let hash_params = fields.non_empty("HASHPARAMS").ok_or_else(|| missing("HASHPARAMS"))?;
    let sent_values = fields
        .non_empty("HASHPARAMSVAL")
        .ok_or_else(|| missing("HASHPARAMSVAL"))?;
    let sent_hash = fields.non_empty("HASH").ok_or_else(|| missing("HASH"))?;

    let reconstructed = reduce_hash_params(hash_params, fields)?;
    if !constant_time_eq::constant_time_eq(reconstructed.as_bytes(), sent_values.as_bytes()) {
        return Err(Error::Security {
            reason: "HASHPARAMSVAL does not match the posted fields".to_string(),
        });
    }

    let computed = algorithm.digest(&reconstructed, secret);
    if !constant_time_eq::constant_time_eq(computed.as_bytes(), sent_hash.as_bytes()) {
        return Err(Error::Security {
            reason: "HASH does not match".to_string(),
        });
    }

    Ok(())
}

/// AES-256-GCM encryption for gateway secrets at rest.
///
/// Ciphertexts are stored as `Base64(nonce || ciphertext)` with a fresh random nonce per call.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Arc<Aes256Gcm>,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    /// Builds a cipher from a Base64-encoded 32-byte key.
    pub fn from_base64_key(key: &str) -> Result<Self> {
        let bytes = STANDARD.decode(key.trim()).map_err(|e| Error::Config {
            message: format!("encryption key is not valid Base64: {e}"),
        })?;

        if bytes.len() != 32 {
            return Err(Error::Config {
                message: format!(
                    "encryption key must be exactly 32 bytes, got {}",
                    bytes.len()
                ),
            });
        }

        let cipher = Aes256Gcm::new_from_slice(&bytes).map_err(|e| Error::Config {
            message: format!("failed to initialize AES-256-GCM: {e}"),
        })?;

        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Generates a fresh random key, Base64-encoded, for operators provisioning a deployment.
    #[must_use]
    pub fn generate_key() -> String {
        STANDARD.encode(Aes256Gcm::generate_key(OsRng))
    }

    /// Encrypts a secret for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto {
                message: format!("encryption failed: {e}"),
            })?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(stored))
    }

    /// Decrypts a stored secret.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let bytes = STANDARD.decode(stored).map_err(|e| Error::Crypto {
            message: format!("stored secret is not valid Base64: {e}"),
        })?;

        if bytes.len() <= NONCE_LEN {
            return Err(Error::Crypto {
                message: "stored secret is too short".to_string(),
            });
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Crypto {
                message: format!("decryption failed: {e}"),
            })?;

        String::from_utf8(plaintext).map_err(|e| Error::Crypto {
            message: format!("stored secret is not UTF-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const SECRET: &str = "TRPS0200";

    fn signed_callback() -> CallbackFields {
        let mut fields: CallbackFields = [
            ("clientid", "190100000"),
            ("oid", "ORD20260101120000ABCDEF"),
            ("AuthCode", "P12345"),
            ("ProcReturnCode", "00"),
            ("Response", "Approved"),
            ("mdStatus", "1"),
            ("rnd", "abc123"),
        ]
        .into_iter()
        .collect();

        let params = "clientid:oid:AuthCode:ProcReturnCode:Response:mdStatus:rnd:";
        let values = reduce_hash_params(params, &fields).unwrap();
        let hash = HashAlgorithm::Sha1Base64.digest(&values, SECRET);
        fields.insert("HASHPARAMS", params);
        fields.insert("HASHPARAMSVAL", values);
        fields.insert("HASH", hash);
        fields
    }

    #[test]
    fn test_sha1_digest_is_deterministic() {
        let a = HashAlgorithm::Sha1Base64.digest("abc", "key");
        let b = HashAlgorithm::Sha1Base64.digest("abc", "key");
        assert_eq!(a, b);
        // SHA-1 is 20 bytes, 28 Base64 characters
        assert_eq!(a.len(), 28);
        assert_ne!(a, HashAlgorithm::Sha1Base64.digest("abc", "other"));
    }

    #[test]
    fn test_sha1_digest_known_vector() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(
            HashAlgorithm::Sha1Base64.digest("ab", "c"),
            "qZk+NkcGgWq6PiVxeFDCbJzQ2J0="
        );
    }

    #[test]
    fn test_sha512_digest_length() {
        // 64 bytes, 88 Base64 characters
        assert_eq!(HashAlgorithm::Sha512Base64.digest("abc", "key").len(), 88);
    }

    #[test]
    fn test_reduce_uses_listed_order_and_skips_absent() {
        let fields: CallbackFields = [("oid", "O1"), ("mdStatus", "1"), ("ProcReturnCode", "00")]
            .into_iter()
            .collect();
        let reduced = reduce_hash_params("mdStatus:oid:cavv:ProcReturnCode:", &fields).unwrap();
        assert_eq!(reduced, "1O100");
    }

    #[test]
    fn test_reduce_rejects_disallowed_field() {
        let fields = CallbackFields::default();
        let result = reduce_hash_params("oid:ProcReturnCode:mdStatus:amount", &fields);
        assert!(matches!(result, Err(Error::Security { .. })));
    }

    #[test]
    fn test_reduce_requires_outcome_fields() {
        let fields = CallbackFields::default();
        let result = reduce_hash_params("oid:Response", &fields);
        assert!(matches!(result, Err(Error::Security { .. })));
    }

    #[test]
    fn test_verify_accepts_valid_callback() {
        assert!(verify_callback_hash(&signed_callback(), SECRET, HashAlgorithm::Sha1Base64).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let result = verify_callback_hash(&signed_callback(), "wrong", HashAlgorithm::Sha1Base64);
        assert!(matches!(result, Err(Error::Security { .. })));
    }

    #[test]
    fn test_verify_rejects_any_flipped_character() {
        let original = signed_callback();
        for name in ["clientid", "oid", "AuthCode", "ProcReturnCode", "Response", "mdStatus", "rnd"] {
            let value = original.get(name).unwrap().to_string();
            for i in 0..value.len() {
                let mut chars: Vec<char> = value.chars().collect();
                chars[i] = if chars[i] == 'X' { 'Y' } else { 'X' };
                let mut tampered = original.clone();
                tampered.insert(name, chars.into_iter().collect::<String>());
                assert!(
                    verify_callback_hash(&tampered, SECRET, HashAlgorithm::Sha1Base64).is_err(),
                    "flip at {name}[{i}] must fail verification"
                );
            }
        }
    }

    #[test]
    fn test_verify_rejects_tampered_hash_and_values() {
        let mut tampered = signed_callback();
        tampered.insert("HASH", "AAAA");
        assert!(verify_callback_hash(&tampered, SECRET, HashAlgorithm::Sha1Base64).is_err());

        let mut tampered = signed_callback();
        let values = format!("{}x", tampered.get("HASHPARAMSVAL").unwrap());
        tampered.insert("HASHPARAMSVAL", values);
        assert!(verify_callback_hash(&tampered, SECRET, HashAlgorithm::Sha1Base64).is_err());
    }

    #[test]
    fn test_verify_rejects_missing_hash() {
        let mut fields = signed_callback();
        fields.insert("HASH", "");
        assert!(matches!(
            verify_callback_hash(&fields, SECRET, HashAlgorithm::Sha1Base64),
            Err(Error::Security { .. })
        ));
    }

    #[test]
    fn test_cipher_roundtrip_and_fresh_nonce() {
        let cipher = SecretCipher::from_base64_key(&SecretCipher::generate_key()).unwrap();
        let a = cipher.encrypt("store-key-123").unwrap();
        let b = cipher.encrypt("store-key-123").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "store-key-123");
        assert_eq!(cipher.decrypt(&b).unwrap(), "store-key-123");
    }

    #[test]
    fn test_cipher_rejects_other_key() {
        let first = SecretCipher::from_base64_key(&SecretCipher::generate_key()).unwrap();
        let second = SecretCipher::from_base64_key(&SecretCipher::generate_key()).unwrap();
        let stored = first.encrypt("secret").unwrap();
        assert!(matches!(second.decrypt(&stored), Err(Error::Crypto { .. })));
    }

    #[test]
    fn test_cipher_rejects_short_key() {
        let key = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            SecretCipher::from_base64_key(&key),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_cipher_debug_hides_key() {
        let cipher = SecretCipher::from_base64_key(&SecretCipher::generate_key()).unwrap();
        assert_eq!(format!("{cipher:?}"), "SecretCipher(..)");
    }
}
