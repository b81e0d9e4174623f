// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! secp256k1 keys and compact recoverable signatures, base58check address
//! rendering and the sha-256 digest helpers used across the chain.

mod base58;
mod errors;
mod keys;
mod signature;

pub use base58::{from_base58check, to_base58check};
pub use errors::Error;
pub use keys::{PrivateKey, PublicKey};
pub use signature::Signature;

use sha2::{Digest, Sha256};

/// A 32-byte sha-256 digest.
pub type Sha256Digest = [u8; 32];

pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double sha-256, used for base58 checksums.
pub fn sha256d(data: &[u8]) -> Sha256Digest {
    sha256(&sha256(data))
}

/// sha-256 truncated to the 20-byte identifier width used by block and
/// transaction ids.
pub fn ripe_digest(data: &[u8]) -> [u8; 20] {
    let d = sha256(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&d[..20]);
    out
}
