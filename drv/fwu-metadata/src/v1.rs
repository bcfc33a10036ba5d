// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::wire::{V1Header, V1ImgEntry, V1ImgProps, METADATA_VERSION_1, V1_HEADER_SIZE, V1_IMG_ENTRY_SIZE};
use crate::MetadataSerializer;
use fwu_types::{AgentError, BankTracker, FwDirectory, Uuid, BANK_SCHEME_NUM_BANKS, FWU_MAX_FW_DIRECTORY_ENTRIES};
use fwu_volume::{banked_usage_id, banked_volume_id, VolumeIndex};
use zerocopy::byteorder::U32;
use zerocopy::{FromBytes, IntoBytes};

/// The fixed-size-header, fixed-size-per-image-entry metadata layout: `crc_32
/// | version=1 | active_index | previous_active_index | img_entry[N]`,
/// `N == fw_dir.num_images()` with no padding to the directory's capacity.
#[derive(Default)]
pub struct MetadataSerializerV1;

impl MetadataSerializerV1 {
    pub fn new() -> Self {
        MetadataSerializerV1
    }
}

fn bank_uuids(volumes: Option<&VolumeIndex>, location_id: u32, bank: usize) -> Option<(Uuid, Uuid)> {
    let volumes = volumes?;
    let volume_id = banked_volume_id(location_id, banked_usage_id(bank));
    volumes.find(volume_id)?.storage_ids()
}

impl MetadataSerializer for MetadataSerializerV1 {
    fn version(&self) -> u32 {
        METADATA_VERSION_1
    }

    fn size(&self, fw_dir: &FwDirectory) -> usize {
        V1_HEADER_SIZE + fw_dir.num_images() * V1_IMG_ENTRY_SIZE
    }

    fn max_size(&self) -> usize {
        V1_HEADER_SIZE + FWU_MAX_FW_DIRECTORY_ENTRIES * V1_IMG_ENTRY_SIZE
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
        let len = self.size(fw_dir);
        if buf.len() < len {
            return Err(AgentError::OutOfBounds);
        }

        let header = V1Header {
            crc_32: U32::new(0),
            version: U32::new(METADATA_VERSION_1),
            active_index: U32::new(active_index),
            previous_active_index: U32::new(previous_active_index),
        };
        // crc_32 is filled in by the caller (`MetadataManager`) after the
        // full payload is known; this just reserves its 4 bytes.
        buf[..V1_HEADER_SIZE].copy_from_slice(header.as_bytes());

        let mut offset = V1_HEADER_SIZE;
        for image in fw_dir.iter() {
            let location_uuid = bank_uuids(volumes, image.location_id, 0)
                .map(|(_, parent)| parent)
                .unwrap_or(Uuid::NIL);

            let mut img_props = [V1ImgProps {
                img_uuid: Uuid::NIL.to_mixed_endian_bytes(),
                accepted: U32::new(0),
                reserved: U32::new(0),
            }; BANK_SCHEME_NUM_BANKS];
            for (bank, props) in img_props.iter_mut().enumerate() {
                let img_uuid = bank_uuids(volumes, image.location_id, bank)
                    .map(|(partition, _)| partition)
                    .unwrap_or(Uuid::NIL);
                props.img_uuid = img_uuid.to_mixed_endian_bytes();
                props.accepted = U32::new(tracker.is_accepted(bank, image.image_index) as u32);
            }

            let entry = V1ImgEntry {
                img_type_uuid: image.img_type_uuid.to_mixed_endian_bytes(),
                location_uuid: location_uuid.to_mixed_endian_bytes(),
                img_props,
            };
            buf[offset..offset + V1_IMG_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
            offset += V1_IMG_ENTRY_SIZE;
        }

        Ok(len)
    }

    fn deserialize_active_indices(&self, buf: &[u8]) -> Option<(u32, u32)> {
        if buf.len() < V1_HEADER_SIZE {
            return None;
        }
        let header = V1Header::read_from_bytes(&buf[..V1_HEADER_SIZE]).ok()?;
        Some((header.active_index.get(), header.previous_active_index.get()))
    }

    fn deserialize_bank_info(&self, tracker: &mut BankTracker, buf: &[u8]) {
        if buf.len() < V1_HEADER_SIZE {
            return;
        }
        let remaining = &buf[V1_HEADER_SIZE..];
        let num_images = remaining.len() / V1_IMG_ENTRY_SIZE;
        if num_images > FWU_MAX_FW_DIRECTORY_ENTRIES {
            return;
        }

        for (img_index, chunk) in remaining.chunks_exact(V1_IMG_ENTRY_SIZE).enumerate() {
            let Ok(entry) = V1ImgEntry::read_from_bytes(chunk) else {
                return;
            };
            for bank in 0..BANK_SCHEME_NUM_BANKS {
                let accepted = entry.img_props[bank].accepted.get() != 0;
                if accepted {
                    tracker.accept(bank, img_index);
                    tracker.set_holds_content(bank);
                } else if !entry.img_props[bank].img_uuid.iter().all(|&b| b == 0) {
                    tracker.set_holds_content(bank);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwu_types::{ImageInfo, ImagePermissions, InstallType};

    fn directory_with_one_image() -> FwDirectory {
        let mut dir = FwDirectory::new();
        dir.add_image_info(ImageInfo {
            img_type_uuid: Uuid::from_u128(0x1111),
            max_size: 1024,
            lowest_accepted_version: 0,
            active_version: 1,
            permissions: ImagePermissions::WRITABLE,
            image_index: 0,
            location_id: 0,
            install_type: InstallType::WholeVolume,
        })
        .unwrap();
        dir
    }

    #[test]
    fn active_indices_round_trip() {
        let ser = MetadataSerializerV1::new();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        let mut buf = vec![0u8; ser.size(&dir)];
        ser.serialize(1, 0, &dir, &tracker, None, &mut buf).unwrap();
        assert_eq!(ser.deserialize_active_indices(&buf), Some((1, 0)));
    }

    #[test]
    fn bank_info_round_trips_accepted_flags() {
        let ser = MetadataSerializerV1::new();
        let dir = directory_with_one_image();
        let mut tracker = BankTracker::new();
        tracker.accept(0, 0);
        let mut buf = vec![0u8; ser.size(&dir)];
        ser.serialize(1, 0, &dir, &tracker, None, &mut buf).unwrap();

        let mut restored = BankTracker::new();
        ser.deserialize_bank_info(&mut restored, &buf);
        assert!(restored.is_accepted(0, 0));
        assert!(!restored.is_accepted(1, 0));
    }

    #[test]
    fn version_is_one() {
        assert_eq!(MetadataSerializerV1::new().version(), 1);
    }
}
