// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{AgentError, Uuid};
use bitflags::bitflags;

/// Bound on the number of images tracked by a single [`FwDirectory`], and on
/// the per-bank accepted-flag arrays carried by a bank tracker.
pub const FWU_MAX_FW_DIRECTORY_ENTRIES: usize = 20;

/// Number of banks in the A/B scheme this workspace implements.
pub const BANK_SCHEME_NUM_BANKS: usize = 2;

bitflags! {
    /// Client-visible permission bits for an image, surfaced in the FWU
    /// Image Directory.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct ImagePermissions: u32 {
        const WRITABLE = 0x0000_0001;
    }
}

/// Which installer strategy handles a location's images.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum InstallType {
    WholeVolume = 0,
    SubVolume = 1,
    WholeVolumeCopy = 2,
}

/// A single updatable logical image, as known to the agent.
#[derive(Copy, Clone, Debug)]
pub struct ImageInfo {
    pub img_type_uuid: Uuid,
    pub max_size: usize,
    pub lowest_accepted_version: u32,
    pub active_version: u32,
    pub permissions: ImagePermissions,
    /// 0-based index into the owning [`FwDirectory`]; assigned on insertion,
    /// overwriting whatever value the caller supplied.
    pub image_index: usize,
    pub location_id: u32,
    pub install_type: InstallType,
}

/// Indices identifying which bank the bootloader booted and which the
/// agent would like booted next.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BootInfo {
    pub boot_index: u32,
    pub active_index: u32,
    pub previous_active_index: u32,
}

impl BootInfo {
    pub fn correct_boot(&self) -> bool {
        self.active_index == self.boot_index
    }
}

/// The bounded, ordered set of images known to the agent for this boot,
/// populated once by an external `FwInspector` and read-only thereafter.
pub struct FwDirectory {
    pub boot_info: BootInfo,
    entries: heapless::Vec<ImageInfo, FWU_MAX_FW_DIRECTORY_ENTRIES>,
}

impl Default for FwDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FwDirectory {
    pub fn new() -> Self {
        FwDirectory {
            boot_info: BootInfo::default(),
            entries: heapless::Vec::new(),
        }
    }

    /// Appends an image, assigning `image_index` from the current length.
    /// Fails with [`AgentError::Unknown`] once the directory is full.
    pub fn add_image_info(&mut self, mut info: ImageInfo) -> Result<usize, AgentError> {
        let index = self.entries.len();
        info.image_index = index;
        self.entries
            .push(info)
            .map_err(|_| AgentError::Unknown)?;
        Ok(index)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<&ImageInfo> {
        self.entries.iter().find(|e| &e.img_type_uuid == uuid)
    }

    pub fn get(&self, index: usize) -> Option<&ImageInfo> {
        self.entries.get(index)
    }

    pub fn num_images(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageInfo> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(uuid: Uuid) -> ImageInfo {
        ImageInfo {
            img_type_uuid: uuid,
            max_size: 1024,
            lowest_accepted_version: 0,
            active_version: 1,
            permissions: ImagePermissions::WRITABLE,
            image_index: 999, // deliberately wrong, must be overwritten
            location_id: 0,
            install_type: InstallType::WholeVolume,
        }
    }

    #[test]
    fn image_index_assigned_on_insertion() {
        let mut dir = FwDirectory::new();
        let a = dir.add_image_info(image(Uuid::from_mixed_endian_bytes([1; 16]))).unwrap();
        let b = dir.add_image_info(image(Uuid::from_mixed_endian_bytes([2; 16]))).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(dir.get(1).unwrap().image_index, 1);
    }

    #[test]
    fn full_directory_rejects_further_inserts() {
        let mut dir = FwDirectory::new();
        for i in 0..FWU_MAX_FW_DIRECTORY_ENTRIES {
            dir.add_image_info(image(Uuid::from_mixed_endian_bytes([i as u8; 16])))
                .unwrap();
        }
        assert_eq!(
            dir.add_image_info(image(Uuid::from_mixed_endian_bytes([255; 16]))),
            Err(AgentError::Unknown)
        );
    }

    #[test]
    fn find_by_uuid() {
        let mut dir = FwDirectory::new();
        let target = Uuid::from_mixed_endian_bytes([7; 16]);
        dir.add_image_info(image(target)).unwrap();
        assert!(dir.find_by_uuid(&target).is_some());
        assert!(dir.find_by_uuid(&Uuid::from_mixed_endian_bytes([8; 16])).is_none());
    }
}
