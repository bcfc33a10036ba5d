// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-exact on-disk layouts for FWU metadata versions 1 and 2.
//!
//! Every multi-byte field is `zerocopy::byteorder`'s little-endian wrapper
//! rather than a native integer, so the encode/decode is correct regardless
//! of host endianness (the metadata itself is little-endian on the wire by
//! protocol requirement, independent of whatever machine this agent runs on).

use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub(crate) type LU16 = U16<LittleEndian>;
pub(crate) type LU32 = U32<LittleEndian>;

pub const METADATA_VERSION_1: u32 = 1;
pub const METADATA_VERSION_2: u32 = 2;

/// `bank_state` values for the v2 descriptor.
pub mod bank_state {
    pub const INVALID: u8 = 0xff;
    pub const VALID: u8 = 0xfe;
    pub const ACCEPTED: u8 = 0xfc;
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V1Header {
    pub crc_32: LU32,
    pub version: LU32,
    pub active_index: LU32,
    pub previous_active_index: LU32,
}

/// Per-bank image properties within a v1 image entry.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V1ImgProps {
    pub img_uuid: [u8; 16],
    pub accepted: LU32,
    pub reserved: LU32,
}

/// A single image's entry in v1 metadata: its type uuid, its location's
/// uuid, and one [`V1ImgProps`] per bank.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V1ImgEntry {
    pub img_type_uuid: [u8; 16],
    pub location_uuid: [u8; 16],
    pub img_props: [V1ImgProps; 2],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V2Header {
    pub crc_32: LU32,
    pub version: LU32,
    pub active_index: LU32,
    pub previous_active_index: LU32,
    pub metadata_size: LU32,
    pub descriptor_offset: LU16,
    pub reserved: LU16,
    pub bank_state: [u8; 4],
    pub reserved32: LU32,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V2FwStoreDesc {
    pub num_banks: u8,
    pub reserved: u8,
    pub num_images: LU16,
    pub img_entry_size: LU16,
    pub bank_info_entry_size: LU16,
}

/// Per-bank info within a v2 image entry (this implementation's own
/// `bank_info_entry_size`; a deserializer must still honour a larger
/// declared size from the wire).
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V2BankInfo {
    pub img_uuid: [u8; 16],
    pub accepted: u8,
    pub reserved: [u8; 3],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct V2ImgEntryFixed {
    pub img_type_uuid: [u8; 16],
    pub location_uuid: [u8; 16],
}

pub const V2_HEADER_SIZE: usize = core::mem::size_of::<V2Header>();
pub const V2_DESC_SIZE: usize = core::mem::size_of::<V2FwStoreDesc>();
pub const V2_IMG_ENTRY_FIXED_SIZE: usize = core::mem::size_of::<V2ImgEntryFixed>();
pub const V2_BANK_INFO_SIZE: usize = core::mem::size_of::<V2BankInfo>();
pub const V1_HEADER_SIZE: usize = core::mem::size_of::<V1Header>();
pub const V1_IMG_ENTRY_SIZE: usize = core::mem::size_of::<V1ImgEntry>();
