// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Installer;
use fwu_types::{AgentError, FwDirectory, ImageInfo};
use fwu_volume::VolumeIndex;
use std::cell::RefCell;
use std::rc::Rc;

/// A minimal stand-in satisfying the `Installer` trait contract for
/// sub-volume installs.
///
/// Real sub-volume installers understand an image-container format (e.g. a
/// FIP or a partition table nested inside the bank volume) and write only
/// the sub-range belonging to one image; that format-specific logic is out
/// of scope here. This implementation behaves like a whole-volume writer
/// starting at offset zero, useful for exercising the trait contract and
/// the store's installer-selection path in tests without committing to a
/// particular container format.
pub struct SubVolumeInstaller {
    volumes: Rc<RefCell<VolumeIndex>>,
    update_volume_id: Option<u32>,
    opened: bool,
}

impl SubVolumeInstaller {
    pub fn new(volumes: Rc<RefCell<VolumeIndex>>) -> Self {
        SubVolumeInstaller {
            volumes,
            update_volume_id: None,
            opened: false,
        }
    }
}

impl Installer for SubVolumeInstaller {
    fn begin(&mut self, _current_volume_id: u32, update_volume_id: u32) -> Result<(), AgentError> {
        self.update_volume_id = Some(update_volume_id);
        self.opened = false;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    fn abort(&mut self) -> Result<(), AgentError> {
        self.opened = false;
        Ok(())
    }

    fn open(&mut self, _image_info: &ImageInfo) -> Result<(), AgentError> {
        let volume_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        let mut volumes = self.volumes.borrow_mut();
        let volume = volumes.find_mut(volume_id).ok_or(AgentError::NotAvailable)?;
        volume.open()?;
        volume.seek(0)?;
        self.opened = true;
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
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AgentError> {
        if !self.opened {
            return Err(AgentError::Denied);
        }
        let volume_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        if let Some(volume) = self.volumes.borrow_mut().find_mut(volume_id) {
            volume.close()?;
        }
        self.opened = false;
        Ok(())
    }

    fn enumerate(&mut self, _volume_id: u32, _dir: &mut FwDirectory) -> Result<(), AgentError> {
        Ok(())
    }
}
