// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Object lookup failed; `get` callers treat this as a hard error.
    #[error("No {kind} object with instance id {id}")]
    NotFound { kind: &'static str, id: u64 },
}
