// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The deterministic state machine at the heart of an Agora node.
//!
//! A [`Database`] owns the replicated object store and advances it one block
//! at a time. Transactions run their operations through two-phase
//! evaluators inside nested undo sessions; a per-block maintenance pass
//! expires state, releases pledges, settles content awards and keeps the
//! witness schedule rolling. Everything here is single-writer: one lock
//! holder applies a block or a pending transaction at a time, and read-only
//! projections observe only committed state.

mod accessors;
mod authority;
mod awards;
mod csaf;
mod database;
mod errors;
mod evaluators;
mod fork;
mod genesis;
pub mod host;
mod maintenance;
mod objects;
mod pipeline;
mod pledges;
mod schedule;
mod state;
mod voting;

pub use database::{Database, SKIP_AUTHORITY_CHECK, SKIP_NOTHING, SKIP_WITNESS_SIGNATURE};
pub use errors::{Error, EvalError};
pub use genesis::{GenesisAccount, GenesisPlatform, GenesisState, GenesisWitness};
pub use objects::*;
pub use pipeline::{precompute_parallel, OperationResult, ProcessedTransaction};
