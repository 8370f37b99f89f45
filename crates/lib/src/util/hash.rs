//! Canonical serialization and digest helpers shared by fingerprinting and
//! manifest/snapshot hashing.

use sha2::{Digest, Sha256};

/// A 256-bit digest, displayed as lowercase hex.
///
/// Used both for node [`crate::fingerprint::Fingerprint`]s and for content
/// hashes of source blobs. The two are never compared against each other,
/// but sharing one representation avoids a zoo of near-identical hash types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Digest32(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Digest32 {
  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  /// First 8 hex characters, for log lines and CLI summaries.
  pub fn short(&self) -> String {
    hex::encode(&self.0[..4])
  }

  pub fn to_hex(&self) -> String {
    hex::encode(self.0)
  }

  pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
    let bytes = hex::decode(s)?;
    let mut out = [0u8; 32];
    if bytes.len() != 32 {
      return Err(hex::FromHexError::InvalidStringLength);
    }
    out.copy_from_slice(&bytes);
    Ok(Self(out))
  }
}

impl std::fmt::Display for Digest32 {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.to_hex())
  }
}

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
    let s = String::deserialize(d)?;
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
      return Err(serde::de::Error::custom("expected 32-byte digest"));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
  }
}

/// Hash the canonical JSON serialization of `value` (keys sorted, since every
/// hashed type uses `BTreeMap`/sorted `Vec` fields by convention).
pub fn digest_json<T: serde::Serialize>(value: &T) -> Result<Digest32, serde_json::Error> {
  let bytes = serde_json::to_vec(value)?;
  Ok(digest_bytes(&bytes))
}

pub fn digest_bytes(bytes: &[u8]) -> Digest32 {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  let out = hasher.finalize();
  let mut arr = [0u8; 32];
  arr.copy_from_slice(&out);
  Digest32(arr)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hex_roundtrip() {
    let d = digest_bytes(b"hello");
    let hex = d.to_hex();
    assert_eq!(Digest32::from_hex(&hex).unwrap(), d);
  }

  #[test]
  fn short_is_prefix_of_full() {
    let d = digest_bytes(b"hello world");
    assert!(d.to_hex().starts_with(&d.short()));
    assert_eq!(d.short().len(), 8);
  }

  #[test]
  fn json_digest_is_deterministic() {
    let a = digest_json(&"same value").unwrap();
    let b = digest_json(&"same value").unwrap();
    assert_eq!(a, b);
  }
}
