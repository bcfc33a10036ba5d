// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Volume` capability (C1), the `VolumeIndex` registry (C2), and the
//! banked volume-id scheme shared by the store, metadata and agent crates.

mod ids;
mod index;
mod ram;
mod volume;

pub use ids::{
    banked_usage_id, banked_volume_id, bank_scheme_next_index,
    RESERVED_VOLUME_ID_BACKUP_METADATA, RESERVED_VOLUME_ID_PRIMARY_METADATA,
};
pub use index::{VolumeIndex, VOLUME_INDEX_MAX_ENTRIES};
pub use ram::RamVolume;
pub use volume::Volume;
