// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, PrivateKey, PublicKey, Sha256Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compact recoverable secp256k1 signature: recovery id then r || s.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_sig_bytes")] pub [u8; 65]);

impl Signature {
    pub fn sign(digest: &Sha256Digest, key: &PrivateKey) -> Signature {
        let message = libsecp256k1::Message::parse(digest);
        let (sig, recovery) = libsecp256k1::sign(&message, key.as_lib());
        let mut out = [0u8; 65];
        out[0] = recovery.serialize() + 31;
        out[1..].copy_from_slice(&sig.serialize());
        Signature(out)
    }

    /// Recover the signing public key from the digest.
    pub fn recover(&self, digest: &Sha256Digest) -> Result<PublicKey, Error> {
        let message = libsecp256k1::Message::parse(digest);
        if self.0[0] < 31 {
            return Err(Error::InvalidSignature("bad recovery id".into()));
        }
        let recovery = libsecp256k1::RecoveryId::parse(self.0[0] - 31)?;
        let sig = libsecp256k1::Signature::parse_standard_slice(&self.0[1..])?;
        let key = libsecp256k1::recover(&message, &sig, &recovery)?;
        Ok(PublicKey::from_lib(&key))
    }

    /// True when the signature over `digest` recovers to `signer`.
    pub fn verify(&self, digest: &Sha256Digest, signer: &PublicKey) -> bool {
        matches!(self.recover(digest), Ok(k) if k == *signer)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", self.0[..6].iter().map(|b| format!("{b:02x}")).collect::<String>())
    }
}

mod serde_sig_bytes {
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 65], ser: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(&bytes[..], ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 65], D::Error> {
        let v: Vec<u8> = serde_bytes::deserialize(de)?;
        v.try_into()
            .map_err(|_| D::Error::custom("expected 65 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256;

    #[test]
    fn sign_recover_verify() {
        let key = PrivateKey::from_seed("signer");
        let digest = sha256(b"message");
        let sig = Signature::sign(&digest, &key);
        assert_eq!(sig.recover(&digest).unwrap(), key.public_key());
        assert!(sig.verify(&digest, &key.public_key()));
    }

    #[test]
    fn wrong_digest_fails_verification() {
        let key = PrivateKey::from_seed("signer");
        let sig = Signature::sign(&sha256(b"message"), &key);
        assert!(!sig.verify(&sha256(b"other"), &key.public_key()));
    }

    #[test]
    fn wrong_signer_fails_verification() {
        let key = PrivateKey::from_seed("signer");
        let other = PrivateKey::from_seed("other").public_key();
        let digest = sha256(b"message");
        assert!(!Signature::sign(&digest, &key).verify(&digest, &other));
    }
}
