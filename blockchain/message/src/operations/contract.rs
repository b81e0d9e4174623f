// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Fee};
use agora_types::{AccountUid, Amount};
use serde::{Deserialize, Serialize};

/// Invoke a method on a deployed contract. Execution runs through the host
/// callback interface under the per-transaction CPU budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub fee: Fee,
    pub sender: AccountUid,
    pub contract: AccountUid,
    pub method: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub amount: Option<Amount>,
}

impl ContractCall {
    pub fn validate(&self) -> Result<(), Error> {
        if self.method.is_empty() {
            return Err(Error::InvalidOperation("empty contract method".into()));
        }
        if matches!(self.amount, Some(a) if a.amount <= 0) {
            return Err(Error::InvalidOperation("attached amount must be positive".into()));
        }
        Ok(())
    }
}

/// A transfer emitted by contract execution. Rejected when submitted
/// directly in a transaction; only the host may apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineTransfer {
    pub fee: Fee,
    pub contract: AccountUid,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Amount,
    pub memo: Option<String>,
}

impl InlineTransfer {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount.amount <= 0 {
            return Err(Error::InvalidOperation("transfer amount must be positive".into()));
        }
        Ok(())
    }
}
