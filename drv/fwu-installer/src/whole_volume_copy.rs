// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Installer;
use fwu_types::{AgentError, FwDirectory, ImageInfo};
use fwu_volume::VolumeIndex;
use std::cell::RefCell;
use std::rc::Rc;

/// Chunk size used to copy bytes from the boot bank to the update bank.
pub const COPY_CHUNK_SIZE: usize = 4096;

/// Duplicates the boot bank's volume into the update bank's volume,
/// byte-for-byte, without consuming any externally streamed data.
///
/// Used by `finalize_install` to carry forward the locations a partial
/// update didn't touch. `open`/`write`/`commit` are not meaningful for this
/// installer and always return [`AgentError::Denied`]; its `enumerate` adds
/// no directory entries, since a copy installer does not advertise images
/// of its own.
pub struct WholeVolumeCopyInstaller {
    volumes: Rc<RefCell<VolumeIndex>>,
    current_volume_id: Option<u32>,
    update_volume_id: Option<u32>,
}

impl WholeVolumeCopyInstaller {
    pub fn new(volumes: Rc<RefCell<VolumeIndex>>) -> Self {
        WholeVolumeCopyInstaller {
            volumes,
            current_volume_id: None,
            update_volume_id: None,
        }
    }
}

impl Installer for WholeVolumeCopyInstaller {
    fn begin(&mut self, current_volume_id: u32, update_volume_id: u32) -> Result<(), AgentError> {
        self.current_volume_id = Some(current_volume_id);
        self.update_volume_id = Some(update_volume_id);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), AgentError> {
        let current_id = self.current_volume_id.ok_or(AgentError::Denied)?;
        let update_id = self.update_volume_id.ok_or(AgentError::Denied)?;
        let mut volumes = self.volumes.borrow_mut();

        let (src_size, dst_size) = {
            let src = volumes.find_mut(current_id).ok_or(AgentError::NotAvailable)?;
            src.open()?;
            let src_size = src.size()?;
            let dst = volumes.find_mut(update_id).ok_or(AgentError::NotAvailable)?;
            dst.open()?;
            let dst_size = dst.size()?;
            (src_size, dst_size)
        };
        let total = src_size.min(dst_size);

        {
            let dst = volumes.find_mut(update_id).ok_or(AgentError::NotAvailable)?;
            dst.erase()?;
        }

        let mut remaining = total;
        let mut chunk = [0u8; COPY_CHUNK_SIZE];
        while remaining > 0 {
            let n = remaining.min(COPY_CHUNK_SIZE);
            {
                let src = volumes.find_mut(current_id).ok_or(AgentError::NotAvailable)?;
                let read = src.read(&mut chunk[..n])?;
                if read != n {
                    return Err(AgentError::Unknown);
                }
            }
            {
                let dst = volumes.find_mut(update_id).ok_or(AgentError::NotAvailable)?;
                dst.write(&chunk[..n])?;
            }
            remaining -= n;
        }

        {
            let src = volumes.find_mut(current_id).ok_or(AgentError::NotAvailable)?;
            src.close()?;
        }
        {
            let dst = volumes.find_mut(update_id).ok_or(AgentError::NotAvailable)?;
            dst.close()?;
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    fn open(&mut self, _image_info: &ImageInfo) -> Result<(), AgentError> {
        Err(AgentError::Denied)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<(), AgentError> {
        Err(AgentError::Denied)
    }

    fn commit(&mut self) -> Result<(), AgentError> {
        Err(AgentError::Denied)
    }

    fn enumerate(&mut self, _volume_id: u32, _dir: &mut FwDirectory) -> Result<(), AgentError> {
        Ok(())
    }
}
