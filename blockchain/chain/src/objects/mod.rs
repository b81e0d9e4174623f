// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The replicated object model. Every struct here is a table row; secondary
//! index layouts are declared next to each type and recomputed by the store
//! on every mutation. Cross-object references are identifiers, never
//! pointers; resolution happens through the store on use.

mod account;
mod asset;
mod content;
mod global;
mod governance;

pub use account::*;
pub use asset::*;
pub use content::*;
pub use global::*;
pub use governance::*;
