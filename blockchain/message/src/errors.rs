// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Structural validation of an operation failed before evaluation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// Fee components are negative or inconsistent.
    #[error("Invalid fee: {0}")]
    InvalidFee(String),
    /// An authority struct is malformed (zero threshold, unreachable weights,
    /// too many members).
    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),
    /// The provided signatures do not satisfy a required authority.
    #[error("Missing required authority of account {account}")]
    MissingAuthority { account: u64 },
    /// A signature that contributes to no required authority.
    #[error("Irrelevant signature from {0}")]
    IrrelevantSignature(String),
    /// The same key signed twice.
    #[error("Duplicate signature")]
    DuplicateSignature,
    /// Signature bytes failed recovery.
    #[error("Signature recovery failed: {0}")]
    SignatureRecovery(String),
    /// Transactions must carry at least one operation.
    #[error("Transaction has no operations")]
    EmptyTransaction,
}

impl From<agora_crypto::Error> for Error {
    fn from(e: agora_crypto::Error) -> Error {
        Error::SignatureRecovery(e.to_string())
    }
}
