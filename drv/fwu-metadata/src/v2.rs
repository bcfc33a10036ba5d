// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::wire::{
    bank_state, V2BankInfo, V2FwStoreDesc, V2Header, V2ImgEntryFixed, METADATA_VERSION_2,
    V2_BANK_INFO_SIZE, V2_DESC_SIZE, V2_HEADER_SIZE, V2_IMG_ENTRY_FIXED_SIZE,
};
use crate::MetadataSerializer;
use fwu_types::{
    AgentError, BankTracker, FwDirectory, Uuid, BANK_SCHEME_NUM_BANKS, FWU_MAX_FW_DIRECTORY_ENTRIES,
};
use fwu_volume::{banked_usage_id, banked_volume_id, VolumeIndex};
use zerocopy::byteorder::U16;
use zerocopy::{FromBytes, IntoBytes};

/// Number of bank slots the fixed v2 header always carries (this
/// implementation is A/B only, so indices 2 and 3 are always `INVALID`).
const HEADER_BANK_SLOTS: usize = 4;

/// The variable-size, offset-addressed metadata layout described in §3/§4.4
/// of the design notes: a 32-byte header (always present) optionally
/// followed, at `descriptor_offset`, by a `fw_store_desc` and per-image
/// entries.
#[derive(Default)]
pub struct MetadataSerializerV2;

impl MetadataSerializerV2 {
    pub fn new() -> Self {
        MetadataSerializerV2
    }

    fn entry_size() -> usize {
        V2_IMG_ENTRY_FIXED_SIZE + BANK_SCHEME_NUM_BANKS * V2_BANK_INFO_SIZE
    }
}

fn bank_uuids(volumes: Option<&VolumeIndex>, location_id: u32, bank: usize) -> Option<(Uuid, Uuid)> {
    let volumes = volumes?;
    let volume_id = banked_volume_id(location_id, banked_usage_id(bank));
    volumes.find(volume_id)?.storage_ids()
}

impl MetadataSerializer for MetadataSerializerV2 {
    fn version(&self) -> u32 {
        METADATA_VERSION_2
    }

    fn size(&self, fw_dir: &FwDirectory) -> usize {
        let n = fw_dir.num_images();
        if n == 0 {
            V2_HEADER_SIZE
        } else {
            V2_HEADER_SIZE + V2_DESC_SIZE + n * Self::entry_size()
        }
    }

    fn max_size(&self) -> usize {
        V2_HEADER_SIZE + V2_DESC_SIZE + FWU_MAX_FW_DIRECTORY_ENTRIES * Self::entry_size()
    }

    fn serialize(
        &self,
        active_index: u32,
        previous_active_index: u32,
        fw_dir: &FwDirectory,
        tracker: &BankTracker,
        volumes: Option<&VolumeIndex>,
        buf: &mut [u8],
    ) -> Result<usize, AgentError> {
        let total_len = self.size(fw_dir);
        if buf.len() < total_len {
            return Err(AgentError::OutOfBounds);
        }
        let n = fw_dir.num_images();

        let mut bank_state_bytes = [bank_state::INVALID; HEADER_BANK_SLOTS];
        for (bank, state) in bank_state_bytes.iter_mut().enumerate().take(BANK_SCHEME_NUM_BANKS) {
            *state = if tracker.is_all_accepted(bank, n) {
                bank_state::ACCEPTED
            } else if tracker.is_content(bank) {
                bank_state::VALID
            } else {
                bank_state::INVALID
            };
        }

        let descriptor_offset = if n == 0 { total_len } else { V2_HEADER_SIZE };
        let header = V2Header {
            crc_32: zerocopy::byteorder::U32::new(0),
            version: zerocopy::byteorder::U32::new(METADATA_VERSION_2),
            active_index: zerocopy::byteorder::U32::new(active_index),
            previous_active_index: zerocopy::byteorder::U32::new(previous_active_index),
            metadata_size: zerocopy::byteorder::U32::new(total_len as u32),
            descriptor_offset: U16::new(descriptor_offset as u16),
            reserved: U16::new(0),
            bank_state: bank_state_bytes,
            reserved32: zerocopy::byteorder::U32::new(0),
        };
        buf[..V2_HEADER_SIZE].copy_from_slice(header.as_bytes());

        if n == 0 {
            return Ok(total_len);
        }

        let entry_size = Self::entry_size();
        let desc = V2FwStoreDesc {
            num_banks: BANK_SCHEME_NUM_BANKS as u8,
            reserved: 0,
            num_images: U16::new(n as u16),
            img_entry_size: U16::new(entry_size as u16),
            bank_info_entry_size: U16::new(V2_BANK_INFO_SIZE as u16),
        };
        let desc_start = V2_HEADER_SIZE;
        buf[desc_start..desc_start + V2_DESC_SIZE].copy_from_slice(desc.as_bytes());

        let mut offset = desc_start + V2_DESC_SIZE;
        for image in fw_dir.iter() {
            let location_uuid = bank_uuids(volumes, image.location_id, 0)
                .map(|(_, parent)| parent)
                .unwrap_or(Uuid::NIL);
            let fixed = V2ImgEntryFixed {
                img_type_uuid: image.img_type_uuid.to_mixed_endian_bytes(),
                location_uuid: location_uuid.to_mixed_endian_bytes(),
            };
            buf[offset..offset + V2_IMG_ENTRY_FIXED_SIZE].copy_from_slice(fixed.as_bytes());

            let mut bank_offset = offset + V2_IMG_ENTRY_FIXED_SIZE;
            for bank in 0..BANK_SCHEME_NUM_BANKS {
                let img_uuid = bank_uuids(volumes, image.location_id, bank)
                    .map(|(partition, _)| partition)
                    .unwrap_or(Uuid::NIL);
                let info = V2BankInfo {
                    img_uuid: img_uuid.to_mixed_endian_bytes(),
                    accepted: tracker.is_accepted(bank, image.image_index) as u8,
                    reserved: [0; 3],
                };
                buf[bank_offset..bank_offset + V2_BANK_INFO_SIZE].copy_from_slice(info.as_bytes());
                bank_offset += V2_BANK_INFO_SIZE;
            }
            offset += entry_size;
        }

        Ok(total_len)
    }

    fn deserialize_active_indices(&self, buf: &[u8]) -> Option<(u32, u32)> {
        let header = read_header(buf)?;
        Some((header.active_index.get(), header.previous_active_index.get()))
    }

    fn deserialize_bank_info(&self, tracker: &mut BankTracker, buf: &[u8]) {
        let Some(header) = read_header(buf) else {
            return;
        };
        let metadata_size = header.metadata_size.get() as usize;
        let descriptor_offset = header.descriptor_offset.get() as usize;
        if metadata_size > buf.len() || descriptor_offset > metadata_size {
            return;
        }

        for bank in 0..BANK_SCHEME_NUM_BANKS {
            match header.bank_state[bank] {
                bank_state::ACCEPTED => tracker.set_holds_accepted_content(bank),
                bank_state::VALID => tracker.set_holds_content(bank),
                _ => tracker.set_no_content(bank),
            }
        }

        if descriptor_offset == metadata_size {
            return;
        }
        if descriptor_offset + V2_DESC_SIZE > metadata_size {
            return;
        }
        let Ok(desc) =
            V2FwStoreDesc::read_from_bytes(&buf[descriptor_offset..descriptor_offset + V2_DESC_SIZE])
        else {
            return;
        };

        let num_banks = desc.num_banks as usize;
        let num_images = desc.num_images.get() as usize;
        let img_entry_size = desc.img_entry_size.get() as usize;
        let bank_info_entry_size = desc.bank_info_entry_size.get() as usize;

        if num_banks > BANK_SCHEME_NUM_BANKS || num_images > FWU_MAX_FW_DIRECTORY_ENTRIES {
            return;
        }
        if img_entry_size < V2_IMG_ENTRY_FIXED_SIZE || bank_info_entry_size < V2_BANK_INFO_SIZE {
            return;
        }
        if img_entry_size < V2_IMG_ENTRY_FIXED_SIZE + num_banks * bank_info_entry_size {
            return;
        }

        let entries_start = descriptor_offset + V2_DESC_SIZE;
        let Some(entries_total) = num_images.checked_mul(img_entry_size) else {
            return;
        };
        let Some(entries_end) = entries_start.checked_add(entries_total) else {
            return;
        };
        if entries_end > metadata_size || entries_end > buf.len() {
            return;
        }

        for img_index in 0..num_images {
            let entry_start = entries_start + img_index * img_entry_size;
            let entry_bytes = &buf[entry_start..entry_start + img_entry_size];
            for bank in 0..num_banks {
                let bank_offset = V2_IMG_ENTRY_FIXED_SIZE + bank * bank_info_entry_size;
                let Some(bank_bytes) = entry_bytes.get(bank_offset..bank_offset + V2_BANK_INFO_SIZE)
                else {
                    continue;
                };
                let Ok(info) = V2BankInfo::read_from_bytes(bank_bytes) else {
                    continue;
                };
                if info.accepted != 0 {
                    tracker.accept(bank, img_index);
                }
            }
        }
    }
}

fn read_header(buf: &[u8]) -> Option<V2Header> {
    if buf.len() < V2_HEADER_SIZE {
        return None;
    }
    V2Header::read_from_bytes(&buf[..V2_HEADER_SIZE]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwu_types::{ImageInfo, ImagePermissions, InstallType};

    fn directory_with_images(n: usize) -> FwDirectory {
        let mut dir = FwDirectory::new();
        for i in 0..n {
            dir.add_image_info(ImageInfo {
                img_type_uuid: Uuid::from_u128(i as u128 + 1),
                max_size: 1024,
                lowest_accepted_version: 0,
                active_version: 1,
                permissions: ImagePermissions::WRITABLE,
                image_index: 0,
                location_id: i as u32,
                install_type: InstallType::WholeVolume,
            })
            .unwrap();
        }
        dir
    }

    #[test]
    fn version_is_two() {
        assert_eq!(MetadataSerializerV2::new().version(), 2);
    }

    #[test]
    fn active_indices_round_trip() {
        let ser = MetadataSerializerV2::new();
        let dir = directory_with_images(2);
        let tracker = BankTracker::new();
        let mut buf = vec![0u8; ser.size(&dir)];
        ser.serialize(1, 0, &dir, &tracker, None, &mut buf).unwrap();
        assert_eq!(ser.deserialize_active_indices(&buf), Some((1, 0)));
    }

    #[test]
    fn bank_info_round_trips_accepted_and_content() {
        let ser = MetadataSerializerV2::new();
        let dir = directory_with_images(2);
        let mut tracker = BankTracker::new();
        tracker.set_holds_content(0);
        tracker.accept(0, 0);
        let mut buf = vec![0u8; ser.size(&dir)];
        ser.serialize(1, 0, &dir, &tracker, None, &mut buf).unwrap();

        let mut restored = BankTracker::new();
        ser.deserialize_bank_info(&mut restored, &buf);
        assert!(restored.is_content(0));
        assert!(restored.is_accepted(0, 0));
        assert!(!restored.is_accepted(0, 1));
        assert!(!restored.is_content(1));
    }

    #[test]
    fn all_accepted_bank_state_is_accepted() {
        let ser = MetadataSerializerV2::new();
        let dir = directory_with_images(1);
        let mut tracker = BankTracker::new();
        tracker.set_holds_accepted_content(0);
        let mut buf = vec![0u8; ser.size(&dir)];
        ser.serialize(1, 0, &dir, &tracker, None, &mut buf).unwrap();
        assert_eq!(buf[28], bank_state::ACCEPTED);
    }

    #[test]
    fn tolerates_oversized_declared_entry_size() {
        let ser = MetadataSerializerV2::new();
        let dir = directory_with_images(1);
        let mut tracker = BankTracker::new();
        tracker.accept(0, 0);
        let entry_size = MetadataSerializerV2::entry_size();
        let mut buf = vec![0u8; V2_HEADER_SIZE + V2_DESC_SIZE + entry_size + 16];
        let written = ser.serialize(0, 1, &dir, &tracker, None, &mut buf).unwrap();
        assert!(written <= buf.len());

        // Bump the declared entry size to simulate a newer-format writer
        // appending extra trailing fields this implementation doesn't know
        // about, and pad the buffer accordingly.
        let new_entry_size = entry_size + 16;
        let desc = V2FwStoreDesc::read_from_bytes(
            &buf[V2_HEADER_SIZE..V2_HEADER_SIZE + V2_DESC_SIZE],
        )
        .unwrap();
        let mut desc = desc;
        desc.img_entry_size = U16::new(new_entry_size as u16);
        let metadata_size = V2_HEADER_SIZE + V2_DESC_SIZE + new_entry_size;
        buf.resize(metadata_size, 0);
        buf[V2_HEADER_SIZE..V2_HEADER_SIZE + V2_DESC_SIZE].copy_from_slice(desc.as_bytes());
        let mut header = read_header(&buf).unwrap();
        header.metadata_size = zerocopy::byteorder::U32::new(metadata_size as u32);
        buf[..V2_HEADER_SIZE].copy_from_slice(header.as_bytes());

        let mut restored = BankTracker::new();
        ser.deserialize_bank_info(&mut restored, &buf);
        assert!(restored.is_accepted(0, 0));
    }
}
