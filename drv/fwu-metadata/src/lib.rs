// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-exact FWU metadata encode/decode (v1, v2) and dual-copy
//! load/repair/write management.

mod crc;
mod manager;
mod serializer;
mod v1;
mod v2;
mod wire;

pub use crc::crc32;
pub use manager::MetadataManager;
pub use serializer::MetadataSerializer;
pub use v1::MetadataSerializerV1;
pub use v2::MetadataSerializerV2;
pub use wire::{bank_state, METADATA_VERSION_1, METADATA_VERSION_2};
