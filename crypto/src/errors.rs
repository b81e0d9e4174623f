// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Byte slice could not be interpreted as a point on the curve.
    #[error("Invalid public key: {0}")]
    InvalidPubKey(String),
    /// Secret key bytes outside the curve order.
    #[error("Invalid private key: {0}")]
    InvalidPrivKey(String),
    /// Signature failed structural parsing or verification.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// Malformed base58check input.
    #[error("Invalid base58 string: {0}")]
    InvalidBase58(String),
}

impl From<libsecp256k1::Error> for Error {
    fn from(e: libsecp256k1::Error) -> Error {
        Error::InvalidSignature(e.to_string())
    }
}
