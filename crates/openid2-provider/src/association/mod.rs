//! Associations and assertion signing
//!
//! An association is a shared secret between the provider and a relying
//! party, identified by an opaque handle. Positive assertions are signed
//! with the association's HMAC over an ordered list of message fields, and
//! the same computation verifies them.
//!
//! ## Signed content
//!
//! For each field name in the signed list, in order, the line
//! `"<field>:<value>\n"` is appended (missing fields sign as empty values).
//! The HMAC of that byte sequence is emitted as URL-safe base64.

pub mod manager;
pub mod store;

pub use manager::AssociationManager;
#[cfg(feature = "memory")]
pub use store::MemoryAssociationStore;
pub use store::AssociationStore;

use crate::encoding::{write_key_value_pair, Params};
use crate::error::{ProviderError, ProviderResult};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Supported association (signature) types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssociationType {
    /// HMAC using SHA-1
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    /// HMAC using SHA-256
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl AssociationType {
    /// Get the protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::HmacSha1 => "HMAC-SHA1",
            AssociationType::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Output length of the underlying digest in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            AssociationType::HmacSha1 => 20,
            AssociationType::HmacSha256 => 32,
        }
    }
}

impl fmt::Display for AssociationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HMAC-SHA1" => Ok(AssociationType::HmacSha1),
            "HMAC-SHA256" => Ok(AssociationType::HmacSha256),
            other => Err(ProviderError::UnsupportedAssociationType(other.to_string())),
        }
    }
}

/// A shared secret context.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Association {
    /// Relying party context; empty for associations the provider created
    /// on its own.
    pub endpoint: String,

    /// Opaque handle, unique per endpoint.
    pub handle: String,

    /// Shared HMAC key.
    pub secret: Vec<u8>,

    /// Signing algorithm.
    #[serde(rename = "type")]
    pub assoc_type: AssociationType,

    /// The association is invalid at or after this instant.
    pub expires: DateTime<Utc>,
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("endpoint", &self.endpoint)
            .field("handle", &self.handle)
            .field("secret", &"[REDACTED]")
            .field("assoc_type", &self.assoc_type)
            .field("expires", &self.expires)
            .finish()
    }
}

impl Association {
    /// Check whether the association has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    /// Check whether the association has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Sign the `signed` fields of `params`.
    ///
    /// # Returns
    ///
    /// URL-safe base64 encoding of the HMAC
    pub fn sign<S: AsRef<str>>(&self, signed: &[S], params: &Params) -> ProviderResult<String> {
        let content = signing_content(signed, params);
        let digest = match self.assoc_type {
            AssociationType::HmacSha1 => {
                let mut mac = HmacSha1::new_from_slice(&self.secret)
                    .map_err(|e| ProviderError::Internal(format!("HMAC key rejected: {}", e)))?;
                mac.update(content.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            AssociationType::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(&self.secret)
                    .map_err(|e| ProviderError::Internal(format!("HMAC key rejected: {}", e)))?;
                mac.update(content.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(URL_SAFE.encode(digest))
    }

    /// Check `expected` against a fresh signature of the `signed` fields.
    ///
    /// The comparison runs in constant time.
    pub fn verify<S: AsRef<str>>(
        &self,
        expected: &str,
        signed: &[S],
        params: &Params,
    ) -> ProviderResult<bool> {
        let actual = self.sign(signed, params)?;
        Ok(constant_time_eq(actual.as_bytes(), expected.as_bytes()))
    }
}

/// Build the exact byte sequence covered by a signature.
fn signing_content<S: AsRef<str>>(signed: &[S], params: &Params) -> String {
    let mut content = String::new();
    for field in signed {
        let field = field.as_ref();
        let value = params.get(field).map(String::as_str).unwrap_or("");
        write_key_value_pair(&mut content, field, value);
    }
    content
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Fill a buffer of `len` bytes from the operating system CSPRNG.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// 16 random bytes as URL-safe text, used for handles and nonces.
pub(crate) fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn association(assoc_type: AssociationType) -> Association {
        Association {
            endpoint: String::new(),
            handle: "handle-1".to_string(),
            secret: b"0123456789abcdef0123456789abcdef".to_vec(),
            assoc_type,
            expires: Utc::now() + Duration::minutes(1),
        }
    }

    fn assertion() -> Params {
        let mut params = Params::new();
        params.insert("op_endpoint".to_string(), "https://op.example/id".to_string());
        params.insert("return_to".to_string(), "https://rp.example/cb".to_string());
        params.insert("claimed_id".to_string(), "https://example.org/u1".to_string());
        params
    }

    const SIGNED: [&str; 3] = ["op_endpoint", "return_to", "claimed_id"];

    #[test]
    fn test_signing_content_layout() {
        let content = signing_content(&["return_to", "missing"], &assertion());
        assert_eq!(content, "return_to:https://rp.example/cb\nmissing:\n");
    }

    #[test]
    fn test_sign_matches_direct_hmac() {
        let assoc = association(AssociationType::HmacSha256);
        let sig = assoc.sign(&SIGNED, &assertion()).unwrap();

        let mut mac = HmacSha256::new_from_slice(&assoc.secret).unwrap();
        mac.update(
            b"op_endpoint:https://op.example/id\nreturn_to:https://rp.example/cb\nclaimed_id:https://example.org/u1\n",
        );
        assert_eq!(sig, URL_SAFE.encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_sha1_and_sha256_differ() {
        let params = assertion();
        let sha1 = association(AssociationType::HmacSha1).sign(&SIGNED, &params).unwrap();
        let sha256 = association(AssociationType::HmacSha256).sign(&SIGNED, &params).unwrap();

        assert_ne!(sha1, sha256);
        assert_eq!(URL_SAFE.decode(&sha1).unwrap().len(), 20);
        assert_eq!(URL_SAFE.decode(&sha256).unwrap().len(), 32);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let assoc = association(AssociationType::HmacSha256);
        let mut params = assertion();
        let sig = assoc.sign(&SIGNED, &params).unwrap();

        assert!(assoc.verify(&sig, &SIGNED, &params).unwrap());

        // Reordered signed list
        let reordered = ["return_to", "op_endpoint", "claimed_id"];
        assert!(!assoc.verify(&sig, &reordered, &params).unwrap());

        // Dropped field
        assert!(!assoc.verify(&sig, &SIGNED[..2], &params).unwrap());

        // Changed value
        params.insert("claimed_id".to_string(), "https://example.org/u2".to_string());
        assert!(!assoc.verify(&sig, &SIGNED, &params).unwrap());
    }

    #[test]
    fn test_association_type_parsing() {
        assert_eq!("HMAC-SHA1".parse::<AssociationType>().unwrap(), AssociationType::HmacSha1);
        assert_eq!(
            "HMAC-SHA256".parse::<AssociationType>().unwrap(),
            AssociationType::HmacSha256
        );
        assert!(matches!(
            "HMAC-MD5".parse::<AssociationType>(),
            Err(ProviderError::UnsupportedAssociationType(_))
        ));
    }

    #[test]
    fn test_association_persistence_rejects_unknown_type() {
        let assoc = association(AssociationType::HmacSha1);
        let json = serde_json::to_string(&assoc).unwrap();
        assert!(json.contains("\"type\":\"HMAC-SHA1\""));

        let tampered = json.replace("HMAC-SHA1", "HMAC-MD5");
        assert!(serde_json::from_str::<Association>(&tampered).is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let assoc = association(AssociationType::HmacSha256);
        assert!(!assoc.is_expired_at(assoc.expires - Duration::seconds(1)));
        assert!(assoc.is_expired_at(assoc.expires));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", association(AssociationType::HmacSha256));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("0123456789abcdef"));
    }

    #[test]
    fn test_random_token_shape() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }
}
