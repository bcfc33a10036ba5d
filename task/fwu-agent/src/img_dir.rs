// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serializes the client-visible FWU Image Directory: a header plus one
//! entry per image in `fw_directory`, carrying each image's current
//! `accepted` bit as tracked by the store.

use fwu_types::FwDirectory;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

type LU32 = U32<LittleEndian>;

pub const DIRECTORY_VERSION: u32 = 2;

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
struct Header {
    directory_version: LU32,
    img_info_offset: LU32,
    num_images: LU32,
    correct_boot: LU32,
    img_info_size: LU32,
    reserved: LU32,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
struct Entry {
    img_type_uuid: [u8; 16],
    client_permissions: LU32,
    img_max_size: LU32,
    lowest_accepted_version: LU32,
    img_version: LU32,
    accepted: LU32,
    reserved: LU32,
}

/// Exact serialized length for `fw_dir`, used to size the buffer stream
/// before calling [`serialize`].
pub fn len(fw_dir: &FwDirectory) -> usize {
    core::mem::size_of::<Header>() + fw_dir.num_images() * core::mem::size_of::<Entry>()
}

/// Builds the directory bytes. `is_accepted` is queried per image rather
/// than taking a whole `BankedFwStore` reference, so this module stays free
/// of a dependency on `fwu-store`.
pub fn serialize(fw_dir: &FwDirectory, is_accepted: impl Fn(usize) -> bool) -> Vec<u8> {
    let header = Header {
        directory_version: LU32::new(DIRECTORY_VERSION),
        img_info_offset: LU32::new(core::mem::size_of::<Header>() as u32),
        num_images: LU32::new(fw_dir.num_images() as u32),
        correct_boot: LU32::new(fw_dir.boot_info.correct_boot() as u32),
        img_info_size: LU32::new(core::mem::size_of::<Entry>() as u32),
        reserved: LU32::new(0),
    };

    let mut bytes = Vec::with_capacity(len(fw_dir));
    bytes.extend_from_slice(header.as_bytes());
    for image in fw_dir.iter() {
        let entry = Entry {
            img_type_uuid: image.img_type_uuid.to_mixed_endian_bytes(),
            client_permissions: LU32::new(image.permissions.bits()),
            img_max_size: LU32::new(image.max_size as u32),
            lowest_accepted_version: LU32::new(image.lowest_accepted_version),
            img_version: LU32::new(image.active_version),
            accepted: LU32::new(is_accepted(image.image_index) as u32),
            reserved: LU32::new(0),
        };
        bytes.extend_from_slice(entry.as_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwu_types::{BootInfo, ImageInfo, ImagePermissions, InstallType, Uuid};

    fn directory() -> FwDirectory {
        let mut dir = FwDirectory::new();
        dir.boot_info = BootInfo {
            boot_index: 0,
            active_index: 0,
            previous_active_index: 0,
        };
        dir.add_image_info(ImageInfo {
            img_type_uuid: Uuid::from_u128(1),
            max_size: 1024,
            lowest_accepted_version: 1,
            active_version: 3,
            permissions: ImagePermissions::WRITABLE,
            image_index: 0,
            location_id: 0,
            install_type: InstallType::WholeVolume,
        })
        .unwrap();
        dir
    }

    #[test]
    fn length_matches_header_plus_entries() {
        let dir = directory();
        assert_eq!(len(&dir), core::mem::size_of::<Header>() + core::mem::size_of::<Entry>());
        let bytes = serialize(&dir, |_| true);
        assert_eq!(bytes.len(), len(&dir));
    }

    #[test]
    fn correct_boot_and_accepted_bits_round_trip() {
        let dir = directory();
        let bytes = serialize(&dir, |idx| idx == 0);
        let header = Header::read_from_bytes(&bytes[..core::mem::size_of::<Header>()]).unwrap();
        assert_eq!({ header.correct_boot }.get(), 1);
        assert_eq!({ header.num_images }.get(), 1);
        let entry_bytes = &bytes[core::mem::size_of::<Header>()..];
        let entry = Entry::read_from_bytes(entry_bytes).unwrap();
        assert_eq!({ entry.accepted }.get(), 1);
        assert_eq!({ entry.img_version }.get(), 3);
    }
}
