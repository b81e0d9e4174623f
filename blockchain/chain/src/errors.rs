// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_types::{AccountUid, Share};
use thiserror::Error;

/// Failure of a single operation evaluator. The pipeline wraps this with the
/// operation index before surfacing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("{kind} not found: {detail}")]
    Missing { kind: &'static str, detail: String },
    #[error("account {account} has {available} core available, needs {required}")]
    InsufficientBalance { account: AccountUid, required: Share, available: Share },
    #[error("account {account} has {available} prepaid, needs {required}")]
    InsufficientPrepaid { account: AccountUid, required: Share, available: Share },
    #[error("account {account} has {available} csaf, needs {required}")]
    InsufficientCsaf { account: AccountUid, required: Share, available: Share },
    /// An `evaluate`-phase precondition did not hold.
    #[error("{0}")]
    Precondition(String),
    /// The operation is structurally valid but the actor lacks the right.
    #[error("{0}")]
    Unauthorized(String),
    /// Contract execution exceeded its CPU budget or recursion bounds.
    #[error("wasm execution error: {0}")]
    WasmExecution(String),
}

impl From<agora_message::Error> for EvalError {
    fn from(e: agora_message::Error) -> EvalError {
        EvalError::Precondition(e.to_string())
    }
}

impl From<agora_db::Error> for EvalError {
    fn from(e: agora_db::Error) -> EvalError {
        match e {
            agora_db::Error::NotFound { kind, id } => {
                EvalError::Missing { kind, detail: format!("instance {id}") }
            }
        }
    }
}

/// Chain-scope errors, per the rejection taxonomy: consensus violations
/// discard blocks, transaction errors reject from mempool or block, internal
/// invariant failures halt the node.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad block: wrong link, slot, signer, timestamp or signature.
    #[error("consensus violation: {0}")]
    ConsensusViolation(String),
    /// The transaction failed outside any operation: TaPoS, expiration,
    /// duplicate id, authority.
    #[error("invalid transaction: {0}")]
    TransactionInvalid(String),
    /// Operation `index` (`name`) failed; the transaction was undone.
    #[error("operation {index} ({name}) failed: {source}")]
    OperationFailed {
        index: usize,
        name: &'static str,
        #[source]
        source: EvalError,
    },
    /// A state invariant does not hold; continuing would diverge.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error(transparent)]
    Db(#[from] agora_db::Error),
    #[error(transparent)]
    Message(#[from] agora_message::Error),
    #[error(transparent)]
    Block(#[from] agora_blocks::Error),
}

impl Error {
    pub fn op_failed(index: usize, name: &'static str, source: EvalError) -> Self {
        Error::OperationFailed { index, name, source }
    }
}
