// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::crc::crc32;
use crate::MetadataSerializer;
use fwu_types::{AgentError, BankTracker, FwDirectory};
use fwu_volume::VolumeIndex;

fn crc_ok(buf: &[u8]) -> bool {
    if buf.len() < 4 {
        return false;
    }
    let stored = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    stored == crc32(&buf[4..])
}

fn read_exact(volumes: &mut VolumeIndex, volume_id: u32, len: usize) -> Option<Vec<u8>> {
    let volume = volumes.find_mut(volume_id)?;
    volume.open().ok()?;
    let result = (|| {
        volume.seek(0).ok()?;
        let mut buf = vec![0u8; len];
        let n = volume.read(&mut buf).ok()?;
        if n != len {
            return None;
        }
        Some(buf)
    })();
    let _ = volume.close();
    result
}

fn write_volume(volumes: &mut VolumeIndex, volume_id: u32, data: &[u8]) -> Result<(), AgentError> {
    let volume = volumes.find_mut(volume_id).ok_or(AgentError::NotAvailable)?;
    volume.open()?;
    let result = (|| -> Result<(), AgentError> {
        volume.erase()?;
        volume.seek(0)?;
        let n = volume.write(data)?;
        if n != data.len() {
            return Err(AgentError::OutOfBounds);
        }
        Ok(())
    })();
    let _ = volume.close();
    result
}

/// Dual-copy metadata load/repair/write, with an in-memory cache carrying
/// `is_valid`/`is_dirty` flags and the last-written CRC.
///
/// Primary-then-backup write order is the sole cross-power-failure ordering
/// guarantee; `check_and_repair` relies on it to decide which copy, if
/// either, needs rewriting.
pub struct MetadataManager {
    primary_volume_id: Option<u32>,
    backup_volume_id: Option<u32>,
    serializer: &'static dyn MetadataSerializer,
    cache: Vec<u8>,
    is_valid: bool,
    is_dirty: bool,
    stored_crc: u32,
}

impl MetadataManager {
    pub fn new(
        primary_volume_id: Option<u32>,
        backup_volume_id: Option<u32>,
        serializer: &'static dyn MetadataSerializer,
    ) -> Self {
        MetadataManager {
            primary_volume_id,
            backup_volume_id,
            serializer,
            cache: Vec::new(),
            is_valid: false,
            is_dirty: false,
            stored_crc: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn check_and_repair(
        &mut self,
        volumes: &mut VolumeIndex,
        fw_dir: &FwDirectory,
    ) -> Result<(), AgentError> {
        if self.is_valid {
            return Ok(());
        }
        if self.primary_volume_id.is_none() && self.backup_volume_id.is_none() {
            return Err(AgentError::NotAvailable);
        }

        let expected_len = self.serializer.size(fw_dir);
        let mut cache = vec![0u8; expected_len];
        let mut primary_valid = false;
        let mut backup_valid = false;
        let mut primary_needs_repair = false;
        let mut backup_needs_repair = false;

        if let Some(pid) = self.primary_volume_id {
            if let Some(buf) = read_exact(volumes, pid, expected_len) {
                if crc_ok(&buf) {
                    cache.copy_from_slice(&buf);
                    primary_valid = true;
                }
            }
        }

        if let Some(bid) = self.backup_volume_id {
            if primary_valid {
                match read_exact(volumes, bid, expected_len) {
                    Some(backup_buf) if crc_ok(&backup_buf) && backup_buf == cache => {
                        backup_valid = true;
                    }
                    _ => backup_needs_repair = true,
                }
            } else if let Some(backup_buf) = read_exact(volumes, bid, expected_len) {
                if crc_ok(&backup_buf) {
                    cache.copy_from_slice(&backup_buf);
                    backup_valid = true;
                    primary_needs_repair = self.primary_volume_id.is_some();
                }
            }
        }

        if !primary_valid && !backup_valid {
            return Err(AgentError::NotAvailable);
        }

        if primary_needs_repair {
            if let Some(pid) = self.primary_volume_id {
                write_volume(volumes, pid, &cache)?;
            }
        }
        if backup_needs_repair {
            if let Some(bid) = self.backup_volume_id {
                write_volume(volumes, bid, &cache)?;
            }
        }

        self.stored_crc = u32::from_le_bytes(cache[0..4].try_into().unwrap());
        self.cache = cache;
        self.is_valid = true;
        Ok(())
    }

    pub fn update(
        &mut self,
        volumes: &mut VolumeIndex,
        active_index: u32,
        previous_active_index: u32,
        fw_dir: &FwDirectory,
        tracker: &BankTracker,
    ) -> Result<(), AgentError> {
        let len = self.serializer.size(fw_dir);
        let mut buf = vec![0u8; len];
        self.serializer.serialize(
            active_index,
            previous_active_index,
            fw_dir,
            tracker,
            Some(&*volumes),
            &mut buf,
        )?;
        let crc = crc32(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());

        self.cache = buf;
        self.is_valid = true;
        self.is_dirty = true;

        if crc == self.stored_crc {
            return Ok(());
        }

        let mut first_err = None;
        if let Some(pid) = self.primary_volume_id {
            if let Err(e) = write_volume(volumes, pid, &self.cache) {
                first_err.get_or_insert(e);
            }
        }
        if let Some(bid) = self.backup_volume_id {
            if let Err(e) = write_volume(volumes, bid, &self.cache) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                self.stored_crc = crc;
                Ok(())
            }
        }
    }

    /// Returns the cached bytes plus whether they changed since the last
    /// `fetch`, clearing the dirty flag.
    pub fn fetch(&mut self) -> (&[u8], bool) {
        let was_dirty = self.is_dirty;
        self.is_dirty = false;
        (&self.cache, was_dirty)
    }

    pub fn get_active_indices(&self) -> Option<(u32, u32)> {
        if !self.is_valid {
            return None;
        }
        self.serializer.deserialize_active_indices(&self.cache)
    }

    pub fn cache_invalidate(&mut self) {
        self.is_valid = false;
    }

    pub fn preload_bank_tracker(&self, tracker: &mut BankTracker) -> Result<(), AgentError> {
        if !self.is_valid {
            return Err(AgentError::NotAvailable);
        }
        self.serializer.deserialize_bank_info(tracker, &self.cache);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::MetadataSerializerV1;
    use fwu_types::{ImageInfo, ImagePermissions, InstallType, Uuid};
    use fwu_volume::RamVolume;

    const PRIMARY: u32 = 0xffff_0000;
    const BACKUP: u32 = 0xffff_0001;

    fn directory_with_one_image() -> FwDirectory {
        let mut dir = FwDirectory::new();
        dir.add_image_info(ImageInfo {
            img_type_uuid: Uuid::from_u128(1),
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

    fn volumes_with_both_copies() -> VolumeIndex {
        let mut volumes = VolumeIndex::new();
        volumes.add(PRIMARY, Box::new(RamVolume::new(256))).unwrap();
        volumes.add(BACKUP, Box::new(RamVolume::new(256))).unwrap();
        volumes
    }

    static SERIALIZER_V1: MetadataSerializerV1 = MetadataSerializerV1;

    #[test]
    fn first_boot_with_no_volumes_is_not_available() {
        let mut mgr = MetadataManager::new(None, None, &SERIALIZER_V1);
        let mut volumes = VolumeIndex::new();
        let dir = directory_with_one_image();
        assert_eq!(
            mgr.check_and_repair(&mut volumes, &dir),
            Err(AgentError::NotAvailable)
        );
    }

    #[test]
    fn update_then_check_and_repair_round_trips() {
        let mut mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut volumes = volumes_with_both_copies();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();

        let mut fresh = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        fresh.check_and_repair(&mut volumes, &dir).unwrap();
        assert_eq!(fresh.get_active_indices(), Some((1, 0)));
    }

    #[test]
    fn update_is_a_no_op_when_crc_unchanged() {
        let mut mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut volumes = volumes_with_both_copies();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();
        let (_, was_dirty) = mgr.fetch();
        assert!(was_dirty);

        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();
        let (_, was_dirty_again) = mgr.fetch();
        assert!(!was_dirty_again);
    }

    #[test]
    fn corrupted_primary_is_repaired_from_intact_backup() {
        let mut mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut volumes = volumes_with_both_copies();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();

        // Simulate corruption of the primary copy in place.
        write_volume(&mut volumes, PRIMARY, &[0u8; 8]).unwrap();

        let mut fresh = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        fresh.check_and_repair(&mut volumes, &dir).unwrap();
        assert_eq!(fresh.get_active_indices(), Some((1, 0)));

        let repaired_primary = read_exact(&mut volumes, PRIMARY, fresh.cache.len()).unwrap();
        assert_eq!(repaired_primary, fresh.cache);
    }

    #[test]
    fn backup_mismatch_after_primary_write_triggers_backup_repair() {
        let mut mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut volumes = volumes_with_both_copies();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();

        // Simulate a power failure between the primary and backup writes:
        // corrupt only the backup.
        write_volume(&mut volumes, BACKUP, &[0u8; 8]).unwrap();

        let mut fresh = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        fresh.check_and_repair(&mut volumes, &dir).unwrap();

        let backup_bytes = read_exact(&mut volumes, BACKUP, fresh.cache.len()).unwrap();
        assert_eq!(backup_bytes, fresh.cache);
    }

    #[test]
    fn cache_invalidate_forces_reload() {
        let mut mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut volumes = volumes_with_both_copies();
        let dir = directory_with_one_image();
        let tracker = BankTracker::new();
        mgr.update(&mut volumes, 1, 0, &dir, &tracker).unwrap();
        assert!(mgr.is_valid());

        mgr.cache_invalidate();
        assert!(!mgr.is_valid());
        mgr.check_and_repair(&mut volumes, &dir).unwrap();
        assert_eq!(mgr.get_active_indices(), Some((1, 0)));
    }

    #[test]
    fn preload_bank_tracker_requires_valid_cache() {
        let mgr = MetadataManager::new(Some(PRIMARY), Some(BACKUP), &SERIALIZER_V1);
        let mut tracker = BankTracker::new();
        assert_eq!(
            mgr.preload_bank_tracker(&mut tracker),
            Err(AgentError::NotAvailable)
        );
    }
}
