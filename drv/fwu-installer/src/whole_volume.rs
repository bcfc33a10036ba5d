// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Installer;
use fwu_types::{AgentError, FwDirectory, ImageInfo, ImagePermissions, InstallType};
use fwu_volume::VolumeIndex;
use std::cell::RefCell;
use std::rc::Rc;

/// Erases the destination volume and writes the streamed bytes verbatim,
/// committing on stream close.
///
/// Rejects a second `open` within one transaction (one image per location)
/// and rejects a zero-length `commit` (this installer has no delete
/// semantics).
pub struct WholeVolumeInstaller {
    volumes: Rc<RefCell<VolumeIndex>>,
    location_id: u32,
    update_volume_id: Option<u32>,
    opened: bool,
    bytes_written: usize,
}

impl WholeVolumeInstaller {
    pub fn new(volumes: Rc<RefCell<VolumeIndex>>, location_id: u32) -> Self {
        WholeVolumeInstaller {
            volumes,
            location_id,
            update_volume_id: None,
            opened: false,
            bytes_written: 0,
        }
    }
}

impl Installer for WholeVolumeInstaller {
    fn begin(&mut self, _current_volume_id: u32, update_volume_id: u32) -> Result<(), AgentError> {
        self.update_volume_id = Some(update_volume_id);
        self.opened = false;
        self.bytes_written = 0;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    fn abort(&mut self) -> Result<(), AgentError> {
        self.opened = false;
        self.bytes_written = 0;
        Ok(())
    }

    fn open(&mut self, _image_info: &ImageInfo) -> Result<(), AgentError> {
        if self.opened {
            return Err(AgentError::Denied);
        }
        let volume_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        let mut volumes = self.volumes.borrow_mut();
        let volume = volumes.find_mut(volume_id).ok_or(AgentError::NotAvailable)?;
        volume.open()?;
        volume.erase()?;
        self.opened = true;
        self.bytes_written = 0;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), AgentError> {
        if !self.opened {
            return Err(AgentError::Denied);
        }
        let volume_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        let mut volumes = self.volumes.borrow_mut();
        let volume = volumes.find_mut(volume_id).ok_or(AgentError::NotAvailable)?;
        volume.write(buf)?;
        self.bytes_written += buf.len();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AgentError> {
        if !self.opened {
            return Err(AgentError::Denied);
        }
        if self.bytes_written == 0 {
            return Err(AgentError::NotAvailable);
        }
        let volume_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        if let Some(volume) = self.volumes.borrow_mut().find_mut(volume_id) {
            volume.close()?;
        }
        self.opened = false;
        Ok(())
    }

    fn enumerate(&mut self, volume_id: u32, dir: &mut FwDirectory) -> Result<(), AgentError> {
        let size = {
            let mut volumes = self.volumes.borrow_mut();
            let volume = volumes.find_mut(volume_id).ok_or(AgentError::NotAvailable)?;
            volume.size()?
        };
        dir.add_image_info(ImageInfo {
            img_type_uuid: fwu_types::Uuid::NIL,
            max_size: size,
            lowest_accepted_version: 0,
            active_version: 0,
            permissions: ImagePermissions::WRITABLE,
            image_index: 0,
            location_id: self.location_id,
            install_type: InstallType::WholeVolume,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwu_volume::RamVolume;

    fn installer_with_volume(capacity: usize) -> (WholeVolumeInstaller, u32) {
        let volumes = Rc::new(RefCell::new(VolumeIndex::new()));
        let volume_id = 0x0000_0001;
        volumes
            .borrow_mut()
            .add(volume_id, Box::new(RamVolume::new(capacity)))
            .unwrap();
        (WholeVolumeInstaller::new(volumes, 0), volume_id)
    }

    fn image() -> ImageInfo {
        ImageInfo {
            img_type_uuid: fwu_types::Uuid::NIL,
            max_size: 16,
            lowest_accepted_version: 0,
            active_version: 1,
            permissions: ImagePermissions::WRITABLE,
            image_index: 0,
            location_id: 0,
            install_type: InstallType::WholeVolume,
        }
    }

    #[test]
    fn second_open_in_one_transaction_is_denied() {
        let (mut inst, volume_id) = installer_with_volume(16);
        inst.begin(0, volume_id).unwrap();
        inst.open(&image()).unwrap();
        assert_eq!(inst.open(&image()), Err(AgentError::Denied));
    }

    #[test]
    fn zero_length_commit_is_rejected() {
        let (mut inst, volume_id) = installer_with_volume(16);
        inst.begin(0, volume_id).unwrap();
        inst.open(&image()).unwrap();
        assert_eq!(inst.commit(), Err(AgentError::NotAvailable));
    }

    #[test]
    fn write_then_commit_succeeds_and_erases_first() {
        let (mut inst, volume_id) = installer_with_volume(16);
        inst.begin(0, volume_id).unwrap();
        inst.open(&image()).unwrap();
        inst.write(b"hello").unwrap();
        inst.commit().unwrap();
    }

    #[test]
    fn oversize_write_surfaces_out_of_bounds() {
        let (mut inst, volume_id) = installer_with_volume(4);
        inst.begin(0, volume_id).unwrap();
        inst.open(&image()).unwrap();
        assert_eq!(inst.write(b"too long"), Err(AgentError::OutOfBounds));
    }
}
