// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Blockchain block error
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Block contains invalid data, as described by the string parameter.
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    /// Invalid signature
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// The declared merkle root does not match the transactions.
    #[error("Transaction merkle root mismatch")]
    MerkleMismatch,
}
