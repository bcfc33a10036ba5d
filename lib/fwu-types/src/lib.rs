// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared wire-adjacent types used across the update-agent workspace:
//! the GUID mixed-endian [`Uuid`], the image/directory data model, and
//! [`AgentError`], the status-code error type shared by every crate.

mod bank_tracker;
mod directory;
mod error;
mod uuid;

pub use bank_tracker::BankTracker;
pub use directory::{
    BootInfo, FwDirectory, ImageInfo, ImagePermissions, InstallType, BANK_SCHEME_NUM_BANKS,
    FWU_MAX_FW_DIRECTORY_ENTRIES,
};
pub use error::AgentError;
pub use uuid::{well_known, Uuid};
