// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The FWU-A update agent: client-facing state machine, stream pool and
//! wire protocol types, built on top of `fwu-store`'s banked firmware
//! store.

mod agent;
mod config;
mod img_dir;
pub mod proto;
mod stream;

pub use agent::{AgentState, OpType, UpdateAgent};
pub use config::{build_store, serializer_for};
pub use stream::{BufferSource, StreamKind, StreamManager, FWU_STREAM_MANAGER_POOL_SIZE};
