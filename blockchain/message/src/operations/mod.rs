// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The operation taxonomy. Variant declaration order fixes the wire tag of
//! every operation; appending is the only compatible evolution.

mod account;
mod asset;
mod content;
mod contract;
mod governance;

pub use account::*;
pub use asset::*;
pub use content::*;
pub use contract::*;
pub use governance::*;

use crate::{AuthClass, Error, Fee};
use agora_types::{platform_permission, AccountUid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Transfer(Transfer),                                   // 0
    AccountCreate(AccountCreate),                         // 1
    AccountManage(AccountManage),                         // 2
    AccountUpdateKey(AccountUpdateKey),                   // 3
    AccountUpdateAuth(AccountUpdateAuth),                 // 4
    AccountAuthPlatform(AccountAuthPlatform),             // 5
    AccountCancelAuthPlatform(AccountCancelAuthPlatform), // 6
    AccountUpdateProxy(AccountUpdateProxy),               // 7
    AccountEnableAllowedAssets(AccountEnableAllowedAssets), // 8
    AccountUpdateAllowedAssets(AccountUpdateAllowedAssets), // 9
    AccountWhitelist(AccountWhitelist),                   // 10
    CsafCollect(CsafCollect),                             // 11
    CsafLease(CsafLease),                                 // 12
    CommitteeMemberCreate(CommitteeMemberCreate),         // 13
    CommitteeMemberUpdate(CommitteeMemberUpdate),         // 14
    CommitteeMemberVoteUpdate(CommitteeMemberVoteUpdate), // 15
    CommitteeProposalCreate(CommitteeProposalCreate),     // 16
    CommitteeProposalUpdate(CommitteeProposalUpdate),     // 17
    WitnessCreate(WitnessCreate),                         // 18
    WitnessUpdate(WitnessUpdate),                         // 19
    WitnessVoteUpdate(WitnessVoteUpdate),                 // 20
    WitnessCollectPay(WitnessCollectPay),                 // 21
    WitnessReport(WitnessReport),                         // 22
    PlatformCreate(PlatformCreate),                       // 23
    PlatformUpdate(PlatformUpdate),                       // 24
    PlatformVoteUpdate(PlatformVoteUpdate),               // 25
    Post(Post),                                           // 26
    PostUpdate(PostUpdate),                               // 27
    ScoreCreate(ScoreCreate),                             // 28
    Reward(Reward),                                       // 29
    RewardProxy(RewardProxy),                             // 30
    Buyout(Buyout),                                       // 31
    LicenseCreate(LicenseCreate),                         // 32
    AssetCreate(AssetCreate),                             // 33
    AssetIssue(AssetIssue),                               // 34
    AssetReserve(AssetReserve),                           // 35
    AssetUpdate(AssetUpdate),                             // 36
    AssetClaimFees(AssetClaimFees),                       // 37
    OverrideTransfer(OverrideTransfer),                   // 38
    ProposalCreate(ProposalCreate),                       // 39
    ProposalUpdate(ProposalUpdate),                       // 40
    ProposalDelete(ProposalDelete),                       // 41
    ContractCall(ContractCall),                           // 42
    InlineTransfer(InlineTransfer),                       // 43
}

macro_rules! for_each_operation {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            Operation::Transfer($op) => $body,
            Operation::AccountCreate($op) => $body,
            Operation::AccountManage($op) => $body,
            Operation::AccountUpdateKey($op) => $body,
            Operation::AccountUpdateAuth($op) => $body,
            Operation::AccountAuthPlatform($op) => $body,
            Operation::AccountCancelAuthPlatform($op) => $body,
            Operation::AccountUpdateProxy($op) => $body,
            Operation::AccountEnableAllowedAssets($op) => $body,
            Operation::AccountUpdateAllowedAssets($op) => $body,
            Operation::AccountWhitelist($op) => $body,
            Operation::CsafCollect($op) => $body,
            Operation::CsafLease($op) => $body,
            Operation::CommitteeMemberCreate($op) => $body,
            Operation::CommitteeMemberUpdate($op) => $body,
            Operation::CommitteeMemberVoteUpdate($op) => $body,
            Operation::CommitteeProposalCreate($op) => $body,
            Operation::CommitteeProposalUpdate($op) => $body,
            Operation::WitnessCreate($op) => $body,
            Operation::WitnessUpdate($op) => $body,
            Operation::WitnessVoteUpdate($op) => $body,
            Operation::WitnessCollectPay($op) => $body,
            Operation::WitnessReport($op) => $body,
            Operation::PlatformCreate($op) => $body,
            Operation::PlatformUpdate($op) => $body,
            Operation::PlatformVoteUpdate($op) => $body,
            Operation::Post($op) => $body,
            Operation::PostUpdate($op) => $body,
            Operation::ScoreCreate($op) => $body,
            Operation::Reward($op) => $body,
            Operation::RewardProxy($op) => $body,
            Operation::Buyout($op) => $body,
            Operation::LicenseCreate($op) => $body,
            Operation::AssetCreate($op) => $body,
            Operation::AssetIssue($op) => $body,
            Operation::AssetReserve($op) => $body,
            Operation::AssetUpdate($op) => $body,
            Operation::AssetClaimFees($op) => $body,
            Operation::OverrideTransfer($op) => $body,
            Operation::ProposalCreate($op) => $body,
            Operation::ProposalUpdate($op) => $body,
            Operation::ProposalDelete($op) => $body,
            Operation::ContractCall($op) => $body,
            Operation::InlineTransfer($op) => $body,
        }
    };
}

impl Operation {
    pub fn tag(&self) -> u32 {
        match self {
            Operation::Transfer(_) => 0,
            Operation::AccountCreate(_) => 1,
            Operation::AccountManage(_) => 2,
            Operation::AccountUpdateKey(_) => 3,
            Operation::AccountUpdateAuth(_) => 4,
            Operation::AccountAuthPlatform(_) => 5,
            Operation::AccountCancelAuthPlatform(_) => 6,
            Operation::AccountUpdateProxy(_) => 7,
            Operation::AccountEnableAllowedAssets(_) => 8,
            Operation::AccountUpdateAllowedAssets(_) => 9,
            Operation::AccountWhitelist(_) => 10,
            Operation::CsafCollect(_) => 11,
            Operation::CsafLease(_) => 12,
            Operation::CommitteeMemberCreate(_) => 13,
            Operation::CommitteeMemberUpdate(_) => 14,
            Operation::CommitteeMemberVoteUpdate(_) => 15,
            Operation::CommitteeProposalCreate(_) => 16,
            Operation::CommitteeProposalUpdate(_) => 17,
            Operation::WitnessCreate(_) => 18,
            Operation::WitnessUpdate(_) => 19,
            Operation::WitnessVoteUpdate(_) => 20,
            Operation::WitnessCollectPay(_) => 21,
            Operation::WitnessReport(_) => 22,
            Operation::PlatformCreate(_) => 23,
            Operation::PlatformUpdate(_) => 24,
            Operation::PlatformVoteUpdate(_) => 25,
            Operation::Post(_) => 26,
            Operation::PostUpdate(_) => 27,
            Operation::ScoreCreate(_) => 28,
            Operation::Reward(_) => 29,
            Operation::RewardProxy(_) => 30,
            Operation::Buyout(_) => 31,
            Operation::LicenseCreate(_) => 32,
            Operation::AssetCreate(_) => 33,
            Operation::AssetIssue(_) => 34,
            Operation::AssetReserve(_) => 35,
            Operation::AssetUpdate(_) => 36,
            Operation::AssetClaimFees(_) => 37,
            Operation::OverrideTransfer(_) => 38,
            Operation::ProposalCreate(_) => 39,
            Operation::ProposalUpdate(_) => 40,
            Operation::ProposalDelete(_) => 41,
            Operation::ContractCall(_) => 42,
            Operation::InlineTransfer(_) => 43,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Transfer(_) => "transfer",
            Operation::AccountCreate(_) => "account_create",
            Operation::AccountManage(_) => "account_manage",
            Operation::AccountUpdateKey(_) => "account_update_key",
            Operation::AccountUpdateAuth(_) => "account_update_auth",
            Operation::AccountAuthPlatform(_) => "account_auth_platform",
            Operation::AccountCancelAuthPlatform(_) => "account_cancel_auth_platform",
            Operation::AccountUpdateProxy(_) => "account_update_proxy",
            Operation::AccountEnableAllowedAssets(_) => "account_enable_allowed_assets",
            Operation::AccountUpdateAllowedAssets(_) => "account_update_allowed_assets",
            Operation::AccountWhitelist(_) => "account_whitelist",
            Operation::CsafCollect(_) => "csaf_collect",
            Operation::CsafLease(_) => "csaf_lease",
            Operation::CommitteeMemberCreate(_) => "committee_member_create",
            Operation::CommitteeMemberUpdate(_) => "committee_member_update",
            Operation::CommitteeMemberVoteUpdate(_) => "committee_member_vote_update",
            Operation::CommitteeProposalCreate(_) => "committee_proposal_create",
            Operation::CommitteeProposalUpdate(_) => "committee_proposal_update",
            Operation::WitnessCreate(_) => "witness_create",
            Operation::WitnessUpdate(_) => "witness_update",
            Operation::WitnessVoteUpdate(_) => "witness_vote_update",
            Operation::WitnessCollectPay(_) => "witness_collect_pay",
            Operation::WitnessReport(_) => "witness_report",
            Operation::PlatformCreate(_) => "platform_create",
            Operation::PlatformUpdate(_) => "platform_update",
            Operation::PlatformVoteUpdate(_) => "platform_vote_update",
            Operation::Post(_) => "post",
            Operation::PostUpdate(_) => "post_update",
            Operation::ScoreCreate(_) => "score_create",
            Operation::Reward(_) => "reward",
            Operation::RewardProxy(_) => "reward_proxy",
            Operation::Buyout(_) => "buyout",
            Operation::LicenseCreate(_) => "license_create",
            Operation::AssetCreate(_) => "asset_create",
            Operation::AssetIssue(_) => "asset_issue",
            Operation::AssetReserve(_) => "asset_reserve",
            Operation::AssetUpdate(_) => "asset_update",
            Operation::AssetClaimFees(_) => "asset_claim_fees",
            Operation::OverrideTransfer(_) => "override_transfer",
            Operation::ProposalCreate(_) => "proposal_create",
            Operation::ProposalUpdate(_) => "proposal_update",
            Operation::ProposalDelete(_) => "proposal_delete",
            Operation::ContractCall(_) => "contract_call",
            Operation::InlineTransfer(_) => "inline_transfer",
        }
    }

    pub fn fee(&self) -> &Fee {
        for_each_operation!(self, op => &op.fee)
    }

    pub fn fee_mut(&mut self) -> &mut Fee {
        for_each_operation!(self, op => &mut op.fee)
    }

    /// The account whose authority pays the fee and authorizes the
    /// operation, plus the weakest authority class that may sign it.
    pub fn required_auth(&self) -> (AccountUid, AuthClass) {
        match self {
            Operation::Transfer(op) => (op.from, AuthClass::Secondary),
            Operation::AccountCreate(op) => (op.reg_info.registrar, AuthClass::Active),
            Operation::AccountManage(op) => (op.executor, AuthClass::Active),
            Operation::AccountUpdateKey(op) => (op.uid, AuthClass::Active),
            Operation::AccountUpdateAuth(op) => (op.uid, AuthClass::Owner),
            Operation::AccountAuthPlatform(op) => (op.uid, AuthClass::Active),
            Operation::AccountCancelAuthPlatform(op) => (op.uid, AuthClass::Active),
            Operation::AccountUpdateProxy(op) => (op.voter, AuthClass::Active),
            Operation::AccountEnableAllowedAssets(op) => (op.account, AuthClass::Active),
            Operation::AccountUpdateAllowedAssets(op) => (op.account, AuthClass::Active),
            Operation::AccountWhitelist(op) => (op.authorizing_account, AuthClass::Active),
            Operation::CsafCollect(op) => (op.from, AuthClass::Active),
            Operation::CsafLease(op) => (op.from, AuthClass::Active),
            Operation::CommitteeMemberCreate(op) => (op.account, AuthClass::Active),
            Operation::CommitteeMemberUpdate(op) => (op.account, AuthClass::Active),
            Operation::CommitteeMemberVoteUpdate(op) => (op.voter, AuthClass::Active),
            Operation::CommitteeProposalCreate(op) => (op.proposer, AuthClass::Active),
            Operation::CommitteeProposalUpdate(op) => (op.account, AuthClass::Active),
            Operation::WitnessCreate(op) => (op.account, AuthClass::Active),
            Operation::WitnessUpdate(op) => (op.account, AuthClass::Active),
            Operation::WitnessVoteUpdate(op) => (op.voter, AuthClass::Active),
            Operation::WitnessCollectPay(op) => (op.account, AuthClass::Active),
            Operation::WitnessReport(op) => (op.reporter, AuthClass::Active),
            Operation::PlatformCreate(op) => (op.account, AuthClass::Active),
            Operation::PlatformUpdate(op) => (op.account, AuthClass::Active),
            Operation::PlatformVoteUpdate(op) => (op.voter, AuthClass::Active),
            Operation::Post(op) => (op.poster, AuthClass::Secondary),
            Operation::PostUpdate(op) => (op.poster, AuthClass::Secondary),
            Operation::ScoreCreate(op) => (op.from_account_uid, AuthClass::Secondary),
            Operation::Reward(op) => (op.from_account_uid, AuthClass::Active),
            Operation::RewardProxy(op) => (op.from_account_uid, AuthClass::Secondary),
            Operation::Buyout(op) => (op.from_account_uid, AuthClass::Secondary),
            Operation::LicenseCreate(op) => (op.platform, AuthClass::Active),
            Operation::AssetCreate(op) => (op.issuer, AuthClass::Active),
            Operation::AssetIssue(op) => (op.issuer, AuthClass::Active),
            Operation::AssetReserve(op) => (op.payer, AuthClass::Active),
            Operation::AssetUpdate(op) => (op.issuer, AuthClass::Active),
            Operation::AssetClaimFees(op) => (op.issuer, AuthClass::Active),
            Operation::OverrideTransfer(op) => (op.issuer, AuthClass::Active),
            Operation::ProposalCreate(op) => (op.fee_paying_account, AuthClass::Active),
            Operation::ProposalUpdate(op) => (op.fee_paying_account, AuthClass::Active),
            Operation::ProposalDelete(op) => {
                let class = if op.using_owner_authority { AuthClass::Owner } else { AuthClass::Active };
                (op.fee_paying_account, class)
            }
            Operation::ContractCall(op) => (op.sender, AuthClass::Active),
            Operation::InlineTransfer(op) => (op.from, AuthClass::Active),
        }
    }

    pub fn fee_payer(&self) -> AccountUid {
        self.required_auth().0
    }

    /// The platform-authorization bit a platform needs to submit this
    /// operation on a user's behalf, if any.
    pub fn platform_permission_required(&self) -> Option<u32> {
        match self {
            Operation::Transfer(_) => Some(platform_permission::TRANSFER),
            Operation::Post(op) => Some(match op.post_type {
                PostType::Comment => platform_permission::COMMENT,
                PostType::Forward | PostType::ForwardAndModify => platform_permission::FORWARD,
                PostType::Original => platform_permission::POST,
            }),
            Operation::PostUpdate(_) => Some(platform_permission::POST),
            Operation::ScoreCreate(_) => Some(platform_permission::LIKED),
            Operation::RewardProxy(_) => Some(platform_permission::REWARD),
            Operation::Buyout(_) => Some(platform_permission::BUYOUT),
            _ => None,
        }
    }

    /// Structural validation, before any state is consulted.
    pub fn validate(&self) -> Result<(), Error> {
        self.fee().validate()?;
        for_each_operation!(self, op => op.validate())
    }

    /// Canonical byte length, as charged by per-kilobyte fees.
    pub fn canonical_size(&self) -> usize {
        agora_encoding::serialize_canonical(self).map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_variant_declaration_order() {
        // The canonical serializer writes the serde variant index as the
        // wire tag; `tag()` must agree with it.
        let op = Operation::ScoreCreate(ScoreCreate {
            fee: Fee::default(),
            from_account_uid: 1,
            platform: 2,
            poster: 3,
            post_pid: 1,
            score: 5,
            csaf: 10,
        });
        let bytes = agora_encoding::serialize_canonical(&op).unwrap();
        assert_eq!(bytes[0] as u32, op.tag());
    }
}
