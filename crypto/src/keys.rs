// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{from_base58check, sha256, to_base58check, Error};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Address prefix distinguishing Agora keys from other base58 encodings.
const ADDRESS_PREFIX: u8 = 0x41;

/// A 33-byte compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "serde_bytes_array")] pub [u8; 33]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 33 {
            return Err(Error::InvalidPubKey(format!(
                "expected 33 bytes, got {}",
                bytes.len()
            )));
        }
        // parse to validate the point
        libsecp256k1::PublicKey::parse_compressed(
            bytes.try_into().expect("length checked above"),
        )
        .map_err(|e| Error::InvalidPubKey(e.to_string()))?;
        let mut out = [0u8; 33];
        out.copy_from_slice(bytes);
        Ok(PublicKey(out))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// The cleared-key sentinel: not a curve point, so no signature can
    /// ever verify against it.
    pub fn null() -> Self {
        PublicKey([0u8; 33])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 33]
    }

    pub(crate) fn from_lib(key: &libsecp256k1::PublicKey) -> Self {
        PublicKey(key.serialize_compressed())
    }

    pub(crate) fn to_lib(self) -> Result<libsecp256k1::PublicKey, Error> {
        libsecp256k1::PublicKey::parse_compressed(&self.0)
            .map_err(|e| Error::InvalidPubKey(e.to_string()))
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(34);
        payload.push(ADDRESS_PREFIX);
        payload.extend_from_slice(&self.0);
        write!(f, "{}", to_base58check(&payload))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let payload = from_base58check(s)?;
        if payload.len() != 34 || payload[0] != ADDRESS_PREFIX {
            return Err(Error::InvalidPubKey("bad address payload".into()));
        }
        PublicKey::from_bytes(&payload[1..])
    }
}

/// A secp256k1 secret key. Never serialized by the chain; kept only for
/// block production and tests.
#[derive(Clone)]
pub struct PrivateKey(libsecp256k1::SecretKey);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        libsecp256k1::SecretKey::parse(bytes)
            .map(PrivateKey)
            .map_err(|e| Error::InvalidPrivKey(e.to_string()))
    }

    /// Deterministic key derivation from a seed string, used by genesis
    /// bootstrapping and tests.
    pub fn from_seed(seed: &str) -> Self {
        let mut digest = sha256(seed.as_bytes());
        loop {
            match libsecp256k1::SecretKey::parse(&digest) {
                Ok(k) => return PrivateKey(k),
                // astronomically unlikely; rehash until inside the order
                Err(_) => digest = sha256(&digest),
            }
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_lib(&libsecp256k1::PublicKey::from_secret_key(&self.0))
    }

    pub(crate) fn as_lib(&self) -> &libsecp256k1::SecretKey {
        &self.0
    }
}

mod serde_bytes_array {
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 33], ser: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(&bytes[..], ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 33], D::Error> {
        let v: Vec<u8> = serde_bytes::deserialize(de)?;
        v.try_into()
            .map_err(|_| D::Error::custom("expected 33 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let key = PrivateKey::from_seed("alice").public_key();
        let addr = key.to_string();
        assert_eq!(addr.parse::<PublicKey>().unwrap(), key);
    }

    #[test]
    fn seeds_are_deterministic_and_distinct() {
        assert_eq!(
            PrivateKey::from_seed("w1").public_key(),
            PrivateKey::from_seed("w1").public_key()
        );
        assert_ne!(
            PrivateKey::from_seed("w1").public_key(),
            PrivateKey::from_seed("w2").public_key()
        );
    }
}
