// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Fee, FeeSchedule, Operation};
use agora_crypto::PublicKey;
use agora_types::{
    AccountUid, BlockNum, ContentAwardParameters, ProposalNumber, Share, Timestamp, FULL_PERCENT,
};
use serde::{Deserialize, Serialize};

/// Convert earned coin-seconds from `from` into `to`'s spendable CSAF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsafCollect {
    pub fee: Fee,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Share,
}

impl CsafCollect {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount <= 0 {
            return Err(Error::InvalidOperation("collect amount must be positive".into()));
        }
        Ok(())
    }
}

/// Lease coins from `from` to `to` for CSAF accrual until `expiration`.
/// Leased-out coins still back the lender's pledges but accrue to the
/// lessee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsafLease {
    pub fee: Fee,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Share,
    pub expiration: Timestamp,
}

impl CsafLease {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount < 0 {
            return Err(Error::InvalidOperation("lease amount may not be negative".into()));
        }
        if self.from == self.to {
            return Err(Error::InvalidOperation("cannot lease to self".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMemberCreate {
    pub fee: Fee,
    pub account: AccountUid,
    pub pledge: Share,
    pub url: String,
}

impl CommitteeMemberCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.pledge <= 0 {
            return Err(Error::InvalidOperation("pledge must be positive".into()));
        }
        Ok(())
    }
}

/// `new_pledge == Some(0)` resigns the seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMemberUpdate {
    pub fee: Fee,
    pub account: AccountUid,
    pub new_pledge: Option<Share>,
    pub new_url: Option<String>,
}

impl CommitteeMemberUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_pledge.is_none() && self.new_url.is_none() {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        if matches!(self.new_pledge, Some(p) if p < 0) {
            return Err(Error::InvalidOperation("pledge may not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMemberVoteUpdate {
    pub fee: Fee,
    pub voter: AccountUid,
    pub committee_members_to_add: Vec<AccountUid>,
    pub committee_members_to_remove: Vec<AccountUid>,
}

impl CommitteeMemberVoteUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_vote_lists(&self.committee_members_to_add, &self.committee_members_to_remove)
    }
}

fn validate_vote_lists(add: &[AccountUid], remove: &[AccountUid]) -> Result<(), Error> {
    if add.is_empty() && remove.is_empty() {
        return Err(Error::InvalidOperation("empty vote update".into()));
    }
    for uid in add {
        if remove.contains(uid) {
            return Err(Error::InvalidOperation("vote both added and removed".into()));
        }
    }
    Ok(())
}

/// One typed change inside a committee proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommitteeProposalItem {
    AccountPrivilegeUpdate(AccountPrivilegeUpdate),
    FeeScheduleUpdate(FeeSchedule),
    GlobalParametersUpdate(Box<ParameterUpdates>),
    ContentParametersUpdate(ContentAwardParameters),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPrivilegeUpdate {
    pub account: AccountUid,
    pub can_vote: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_registrar: Option<bool>,
    /// Required when revoking registrar status; accounts registered by the
    /// demoted registrar become manageable by this one.
    pub takeover_registrar: Option<AccountUid>,
    pub is_full_member: Option<bool>,
}

/// Optional updates to scalar global parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterUpdates {
    pub maximum_block_size: Option<u32>,
    pub maximum_transaction_size: Option<u32>,
    pub maximum_time_until_expiration: Option<u32>,
    pub by_vote_top_witness_pay_per_block: Option<Share>,
    pub by_vote_rest_witness_pay_per_block: Option<Share>,
    pub budget_adjust_target: Option<u32>,
    pub min_witness_pledge: Option<Share>,
    pub min_committee_member_pledge: Option<Share>,
    pub min_platform_pledge: Option<Share>,
    pub max_witness_inactive_blocks: Option<u32>,
    pub governance_voting_expiration_blocks: Option<u32>,
    pub csaf_rate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeProposalCreate {
    pub fee: Fee,
    pub proposer: AccountUid,
    pub items: Vec<CommitteeProposalItem>,
    pub voting_closing_block_num: BlockNum,
    pub execution_block_num: BlockNum,
    pub expiration_block_num: BlockNum,
    /// `Some(true)` casts the proposer's own "for" opinion at creation.
    pub proposer_opinion: Option<bool>,
}

impl CommitteeProposalCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.items.is_empty() {
            return Err(Error::InvalidOperation("proposal has no items".into()));
        }
        if self.execution_block_num < self.voting_closing_block_num {
            return Err(Error::InvalidOperation(
                "execution before voting closes".into(),
            ));
        }
        if self.expiration_block_num < self.execution_block_num {
            return Err(Error::InvalidOperation("expiration before execution".into()));
        }
        for item in &self.items {
            if let CommitteeProposalItem::AccountPrivilegeUpdate(update) = item {
                if update.is_registrar == Some(false) && update.takeover_registrar.is_none() {
                    return Err(Error::InvalidOperation(
                        "registrar revocation needs a takeover registrar".into(),
                    ));
                }
            }
            if let CommitteeProposalItem::GlobalParametersUpdate(update) = item {
                if matches!(update.budget_adjust_target, Some(t) if t > FULL_PERCENT) {
                    return Err(Error::InvalidOperation("budget target above 100%".into()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeProposalUpdate {
    pub fee: Fee,
    pub account: AccountUid,
    pub proposal_number: ProposalNumber,
    /// `true` is "for", `false` is "against".
    pub opinion: bool,
}

impl CommitteeProposalUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessCreate {
    pub fee: Fee,
    pub account: AccountUid,
    pub pledge: Share,
    pub signing_key: PublicKey,
    pub url: String,
}

impl WitnessCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.pledge <= 0 {
            return Err(Error::InvalidOperation("pledge must be positive".into()));
        }
        Ok(())
    }
}

/// `new_pledge == Some(0)` resigns the witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessUpdate {
    pub fee: Fee,
    pub account: AccountUid,
    pub new_pledge: Option<Share>,
    pub new_signing_key: Option<PublicKey>,
    pub new_url: Option<String>,
}

impl WitnessUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_pledge.is_none() && self.new_signing_key.is_none() && self.new_url.is_none() {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        if matches!(self.new_pledge, Some(p) if p < 0) {
            return Err(Error::InvalidOperation("pledge may not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessVoteUpdate {
    pub fee: Fee,
    pub voter: AccountUid,
    pub witnesses_to_add: Vec<AccountUid>,
    pub witnesses_to_remove: Vec<AccountUid>,
}

impl WitnessVoteUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_vote_lists(&self.witnesses_to_add, &self.witnesses_to_remove)
    }
}

/// Move accumulated witness pay into the account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessCollectPay {
    pub fee: Fee,
    pub account: AccountUid,
    pub amount: Share,
}

impl WitnessCollectPay {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount <= 0 {
            return Err(Error::InvalidOperation("collect amount must be positive".into()));
        }
        Ok(())
    }
}

/// Report a witness that signed two different blocks at one height. The
/// first accepted report forfeits the offender's uncollected pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessReport {
    pub fee: Fee,
    pub reporter: AccountUid,
    pub witness: AccountUid,
    pub block_num: BlockNum,
    pub first_block_id: [u8; 20],
    pub second_block_id: [u8; 20],
}

impl WitnessReport {
    pub fn validate(&self) -> Result<(), Error> {
        if self.first_block_id == self.second_block_id {
            return Err(Error::InvalidOperation("the two blocks are identical".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCreate {
    pub fee: Fee,
    pub account: AccountUid,
    pub pledge: Share,
    pub name: String,
    pub url: String,
    pub extra_data: String,
}

impl PlatformCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.pledge <= 0 {
            return Err(Error::InvalidOperation("pledge must be positive".into()));
        }
        if self.name.is_empty() {
            return Err(Error::InvalidOperation("platform name required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUpdate {
    pub fee: Fee,
    pub account: AccountUid,
    pub new_pledge: Option<Share>,
    pub new_name: Option<String>,
    pub new_url: Option<String>,
    pub new_extra_data: Option<String>,
}

impl PlatformUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_pledge.is_none()
            && self.new_name.is_none()
            && self.new_url.is_none()
            && self.new_extra_data.is_none()
        {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        if matches!(self.new_pledge, Some(p) if p < 0) {
            return Err(Error::InvalidOperation("pledge may not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVoteUpdate {
    pub fee: Fee,
    pub voter: AccountUid,
    pub platforms_to_add: Vec<AccountUid>,
    pub platforms_to_remove: Vec<AccountUid>,
}

impl PlatformVoteUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_vote_lists(&self.platforms_to_add, &self.platforms_to_remove)
    }
}

/// A generic multi-party proposal: the contained operations execute once the
/// required approval set is covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalCreate {
    pub fee: Fee,
    pub fee_paying_account: AccountUid,
    pub expiration_time: Timestamp,
    pub proposed_ops: Vec<Operation>,
    pub review_period_seconds: Option<u32>,
}

impl ProposalCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.proposed_ops.is_empty() {
            return Err(Error::InvalidOperation("proposal has no operations".into()));
        }
        for op in &self.proposed_ops {
            if matches!(op, Operation::ProposalCreate(_)) {
                // nesting is bounded by fee computation; direct recursion of
                // proposals is still disallowed one level down
                continue;
            }
            op.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalUpdate {
    pub fee: Fee,
    pub fee_paying_account: AccountUid,
    pub proposal: u64,
    pub active_approvals_to_add: Vec<AccountUid>,
    pub active_approvals_to_remove: Vec<AccountUid>,
    pub owner_approvals_to_add: Vec<AccountUid>,
    pub owner_approvals_to_remove: Vec<AccountUid>,
    pub secondary_approvals_to_add: Vec<AccountUid>,
    pub secondary_approvals_to_remove: Vec<AccountUid>,
    pub key_approvals_to_add: Vec<PublicKey>,
    pub key_approvals_to_remove: Vec<PublicKey>,
}

impl ProposalUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        let changes = self.active_approvals_to_add.len()
            + self.active_approvals_to_remove.len()
            + self.owner_approvals_to_add.len()
            + self.owner_approvals_to_remove.len()
            + self.secondary_approvals_to_add.len()
            + self.secondary_approvals_to_remove.len()
            + self.key_approvals_to_add.len()
            + self.key_approvals_to_remove.len();
        if changes == 0 {
            return Err(Error::InvalidOperation("empty approval update".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDelete {
    pub fee: Fee,
    pub fee_paying_account: AccountUid,
    pub using_owner_authority: bool,
    pub proposal: u64,
}

impl ProposalDelete {
    pub fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}
