// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Operation};
use agora_types::{Share, MAX_PROPOSAL_NESTING_DEPTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an operation's fee is funded. Components are all in core-asset
/// satoshis; `from_csaf` burns coin-seconds credit instead of coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub from_balance: Share,
    pub from_prepaid: Share,
    pub from_csaf: Share,
}

impl Fee {
    pub fn from_balance(total: Share) -> Self {
        Fee { from_balance: total, from_prepaid: 0, from_csaf: 0 }
    }

    pub fn total(&self) -> Share {
        self.from_balance + self.from_prepaid + self.from_csaf
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.from_balance < 0 || self.from_prepaid < 0 || self.from_csaf < 0 {
            return Err(Error::InvalidFee("fee components may not be negative".into()));
        }
        Ok(())
    }
}

/// Committee-governed per-operation fee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParameters {
    /// Flat base fee in core satoshis.
    pub fee: Share,
    /// Additional fee per kilobyte of canonical operation bytes.
    pub price_per_kbyte: Share,
}

impl Default for FeeParameters {
    fn default() -> Self {
        FeeParameters { fee: 100, price_per_kbyte: 0 }
    }
}

/// Maps operation tags to their fee parameters. Operations without an entry
/// use [`FeeParameters::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub parameters: BTreeMap<u32, FeeParameters>,
}

impl FeeSchedule {
    pub fn params_for(&self, tag: u32) -> FeeParameters {
        self.parameters.get(&tag).copied().unwrap_or_default()
    }

    pub fn set_params(&mut self, tag: u32, params: FeeParameters) {
        self.parameters.insert(tag, params);
    }

    /// `(base_fee, size_fee)` for `op` as currently filled in.
    pub fn calculate_fee(&self, op: &Operation) -> (Share, Share) {
        let params = self.params_for(op.tag());
        let size_fee = if params.price_per_kbyte > 0 {
            let size = op.canonical_size() as i64;
            ((size as i128) * (params.price_per_kbyte as i128) / 1024) as Share
        } else {
            0
        };
        (params.fee, size_fee)
    }

    /// Fill in `op`'s fee field from this schedule. `proposal_create` is
    /// recursive: nested operations get their fees set first, so the outer
    /// size fee prices the fully-populated proposal.
    pub fn set_fee(&self, op: &mut Operation) -> Result<Share, Error> {
        self.set_fee_at_depth(op, 0)
    }

    fn set_fee_at_depth(&self, op: &mut Operation, depth: u32) -> Result<Share, Error> {
        if depth >= MAX_PROPOSAL_NESTING_DEPTH {
            return Err(Error::InvalidFee("proposal nesting too deep".into()));
        }
        if let Operation::ProposalCreate(inner) = op {
            for nested in inner.proposed_ops.iter_mut() {
                self.set_fee_at_depth(nested, depth + 1)?;
            }
        }
        let (base, size) = self.calculate_fee(op);
        let total = base + size;
        *op.fee_mut() = Fee::from_balance(total);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ProposalCreate, Transfer};
    use agora_types::Amount;

    fn transfer() -> Operation {
        Operation::Transfer(Transfer {
            fee: Fee::default(),
            from: 100,
            to: 101,
            amount: Amount::core(10),
            memo: None,
            from_prepaid: false,
            to_prepaid: false,
        })
    }

    #[test]
    fn set_then_calculate_is_idempotent() {
        let mut schedule = FeeSchedule::default();
        schedule.set_params(0, FeeParameters { fee: 500, price_per_kbyte: 0 });
        let mut op = transfer();
        let total = schedule.set_fee(&mut op).unwrap();
        assert_eq!(total, 500);
        let (base, size) = schedule.calculate_fee(&op);
        assert_eq!(base + size, op.fee().total());
    }

    #[test]
    fn nested_proposal_fees_compose_additively(){
        let mut schedule = FeeSchedule::default();
        schedule.set_params(0, FeeParameters { fee: 300, price_per_kbyte: 0 });
        schedule.set_params(39, FeeParameters { fee: 1_000, price_per_kbyte: 0 });
        let mut op = Operation::ProposalCreate(ProposalCreate {
            fee: Fee::default(),
            fee_paying_account: 100,
            expiration_time: 1_000,
            proposed_ops: vec![transfer(), transfer()],
            review_period_seconds: None,
        });
        schedule.set_fee(&mut op).unwrap();
        assert_eq!(op.fee().total(), 1_000);
        if let Operation::ProposalCreate(inner) = &op {
            for nested in &inner.proposed_ops {
                assert_eq!(nested.fee().total(), 300);
            }
        } else {
            unreachable!();
        }
    }

    #[test]
    fn size_fee_scales_with_payload() {
        let mut schedule = FeeSchedule::default();
        schedule.set_params(0, FeeParameters { fee: 100, price_per_kbyte: 1024 });
        let mut small = transfer();
        let mut large = transfer();
        if let Operation::Transfer(t) = &mut large {
            t.memo = Some("x".repeat(2048));
        }
        schedule.set_fee(&mut small).unwrap();
        schedule.set_fee(&mut large).unwrap();
        assert!(large.fee().total() > small.fee().total() + 2000);
    }
}
