// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Protocol messages: the operation taxonomy, signed transactions, weighted
//! authorities and the fee schedule.

mod auth;
mod authority;
mod errors;
mod fee;
pub mod operations;
mod transaction;

pub use auth::{
    get_potential_signatures, get_required_signatures, verify_authority, AuthorityLookup,
};
pub use authority::{AccountAuthRef, AuthClass, Authority};
pub use errors::Error;
pub use fee::{Fee, FeeParameters, FeeSchedule};
pub use operations::Operation;
pub use transaction::{SignedTransaction, Transaction, TxId};
