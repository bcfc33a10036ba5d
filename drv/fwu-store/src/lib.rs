// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `BankedFwStore` (C7): orchestrates installers, a `BankTracker` and a
//! `MetadataManager` to realize update transactions over an A/B banked
//! firmware store.

use fwu_installer::InstallerIndex;
use fwu_metadata::{MetadataManager, MetadataSerializer};
use fwu_ringbuf::{ringbuf, ringbuf_entry};
use fwu_types::{
    well_known, AgentError, BankTracker, FwDirectory, ImageInfo, InstallType, Uuid,
};
use fwu_volume::{banked_usage_id, banked_volume_id, bank_scheme_next_index, VolumeIndex};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    FirstBoot { boot_index: u32 },
    Synchronized { active_index: u32, previous_active_index: u32 },
    BootloaderFallback { boot_index: u32 },
    FinalizeFailed(AgentError),
    Finalized,
    Reverted,
}

ringbuf!(Trace, 16, Trace::None);

/// Orchestrates installers, the per-bank tracker, and metadata persistence
/// to realize one FWU-A update transaction at a time over an A/B banked
/// store.
///
/// `fw_directory` is populated by `synchronize` (consuming the directory an
/// external `FwInspector` built for this boot) and owned thereafter;
/// `active_installers` holds indices into the shared `InstallerIndex`, never
/// the installers themselves.
pub struct BankedFwStore {
    volumes: Rc<RefCell<VolumeIndex>>,
    installers: Rc<RefCell<InstallerIndex>>,
    tracker: BankTracker,
    manager: MetadataManager,
    fw_directory: Option<FwDirectory>,
    active_installers: Vec<usize>,
    boot_index: usize,
    update_index: usize,
}

impl BankedFwStore {
    pub fn new(
        volumes: Rc<RefCell<VolumeIndex>>,
        installers: Rc<RefCell<InstallerIndex>>,
        serializer: &'static dyn MetadataSerializer,
        primary_volume_id: Option<u32>,
        backup_volume_id: Option<u32>,
    ) -> Self {
        BankedFwStore {
            volumes,
            installers,
            tracker: BankTracker::new(),
            manager: MetadataManager::new(primary_volume_id, backup_volume_id, serializer),
            fw_directory: None,
            active_installers: Vec::new(),
            boot_index: 0,
            update_index: 1,
        }
    }

    pub fn fw_directory(&self) -> Option<&FwDirectory> {
        self.fw_directory.as_ref()
    }

    pub fn boot_index(&self) -> usize {
        self.boot_index
    }

    pub fn update_index(&self) -> usize {
        self.update_index
    }

    fn persist_metadata(
        &mut self,
        active_index: u32,
        previous_active_index: u32,
    ) -> Result<(), AgentError> {
        let mut volumes = self.volumes.borrow_mut();
        {
            let fw_dir = self.fw_directory.as_ref().ok_or(AgentError::NotAvailable)?;
            self.manager.update(
                &mut volumes,
                active_index,
                previous_active_index,
                fw_dir,
                &self.tracker,
            )?;
        }
        drop(volumes);
        if let Some(fw_dir) = self.fw_directory.as_mut() {
            fw_dir.boot_info.active_index = active_index;
            fw_dir.boot_info.previous_active_index = previous_active_index;
        }
        Ok(())
    }

    /// Loads or (on first boot / unrecoverable metadata) bootstraps
    /// persisted state for `fw_dir`, booted from `boot_index`.
    pub fn synchronize(&mut self, mut fw_dir: FwDirectory, boot_index: usize) -> Result<(), AgentError> {
        self.boot_index = boot_index;
        self.update_index = bank_scheme_next_index(boot_index);
        fw_dir.boot_info.boot_index = boot_index as u32;

        let mut volumes = self.volumes.borrow_mut();
        match self.manager.check_and_repair(&mut volumes, &fw_dir) {
            Ok(()) => {
                let (active, previous) = self
                    .manager
                    .get_active_indices()
                    .ok_or(AgentError::NotAvailable)?;
                self.tracker = BankTracker::new();
                self.manager.preload_bank_tracker(&mut self.tracker)?;

                let mut active_index = active;
                let mut previous_index = previous;
                if boot_index != active_index as usize {
                    ringbuf_entry!(Trace::BootloaderFallback { boot_index: boot_index as u32 });
                    active_index = boot_index as u32;
                    previous_index = boot_index as u32;
                    self.manager
                        .update(&mut volumes, active_index, previous_index, &fw_dir, &self.tracker)?;
                }
                fw_dir.boot_info.active_index = active_index;
                fw_dir.boot_info.previous_active_index = previous_index;
                ringbuf_entry!(Trace::Synchronized {
                    active_index,
                    previous_active_index: previous_index
                });
            }
            Err(_) => {
                ringbuf_entry!(Trace::FirstBoot { boot_index: boot_index as u32 });
                self.tracker = BankTracker::new();
                self.tracker.set_holds_accepted_content(boot_index);
                self.manager.update(
                    &mut volumes,
                    boot_index as u32,
                    boot_index as u32,
                    &fw_dir,
                    &self.tracker,
                )?;
                fw_dir.boot_info.active_index = boot_index as u32;
                fw_dir.boot_info.previous_active_index = boot_index as u32;
            }
        }
        drop(volumes);
        self.fw_directory = Some(fw_dir);
        Ok(())
    }

    /// Begins an install transaction: the update bank must start empty and
    /// must not be selectable by the bootloader until `finalize_install`.
    pub fn begin_install(&mut self) -> Result<(), AgentError> {
        if !self.active_installers.is_empty() {
            return Err(AgentError::Denied);
        }
        self.tracker.set_no_content(self.update_index);
        self.persist_metadata(self.boot_index as u32, self.boot_index as u32)
    }

    /// Abandons the in-progress transaction: aborts every installer opened
    /// this transaction (errors ignored, matching `Installer::abort`'s own
    /// best-effort contract) and clears the active set so `begin_install`
    /// can be re-entered. The update bank is left `no_content`, so no
    /// metadata update is needed.
    pub fn abort_install(&mut self) {
        let active = std::mem::take(&mut self.active_installers);
        let mut installers = self.installers.borrow_mut();
        for idx in &active {
            if let Some(entry) = installers.get_mut(*idx) {
                let _ = entry.installer_mut().abort();
            }
        }
        if !active.is_empty() {
            installers.reset_transaction();
        }
    }

    pub fn select_installer(&mut self, image: &ImageInfo) -> Result<usize, AgentError> {
        let mut installers = self.installers.borrow_mut();
        let idx = installers
            .find_by_type_location(image.install_type, image.location_id)
            .ok_or(AgentError::Unknown)?;

        if !self.active_installers.contains(&idx) {
            let current_volume_id =
                banked_volume_id(image.location_id, banked_usage_id(self.boot_index));
            let update_volume_id =
                banked_volume_id(image.location_id, banked_usage_id(self.update_index));
            let entry = installers.get_mut(idx).ok_or(AgentError::Unknown)?;
            entry.is_active = true;
            let begin_result = entry.installer_mut().begin(current_volume_id, update_volume_id);
            entry.latch(begin_result)?;
            self.active_installers.push(idx);
        }

        let entry = installers.get_mut(idx).ok_or(AgentError::Unknown)?;
        let open_result = entry.installer_mut().open(image);
        entry.latch(open_result)?;
        Ok(idx)
    }

    pub fn write_image(&mut self, installer_idx: usize, buf: &[u8]) -> Result<(), AgentError> {
        let mut installers = self.installers.borrow_mut();
        let entry = installers.get_mut(installer_idx).ok_or(AgentError::Unknown)?;
        if !entry.is_active {
            return Err(AgentError::Denied);
        }
        let result = entry.installer_mut().write(buf);
        entry.latch(result)
    }

    pub fn commit_image(
        &mut self,
        installer_idx: usize,
        image: &ImageInfo,
        accepted: bool,
    ) -> Result<(), AgentError> {
        {
            let mut installers = self.installers.borrow_mut();
            let entry = installers.get_mut(installer_idx).ok_or(AgentError::Unknown)?;
            if !entry.is_active {
                return Err(AgentError::Denied);
            }
            let result = entry.installer_mut().commit();
            entry.latch(result)?;
        }
        if accepted {
            self.tracker.accept(self.update_index, image.image_index);
        }
        Ok(())
    }

    /// Completes the transaction: copy-forwards untouched locations via a
    /// registered `WholeVolumeCopy` installer (failing `NotAvailable` if
    /// none exists), finalizes every touched installer in order (aborting
    /// the rest on the first failure), then promotes the update bank.
    pub fn finalize_install(&mut self) -> Result<(), AgentError> {
        if self.active_installers.is_empty() {
            return Err(AgentError::Denied);
        }
        let result = self.finalize_install_inner();
        if let Err(e) = result {
            ringbuf_entry!(Trace::FinalizeFailed(e));
        } else {
            ringbuf_entry!(Trace::Finalized);
        }
        self.active_installers.clear();
        result
    }

    fn finalize_install_inner(&mut self) -> Result<(), AgentError> {
        self.copy_forward_untouched_locations()?;

        let active = self.active_installers.clone();
        let mut first_err: Option<AgentError> = None;
        for &idx in &active {
            let mut installers = self.installers.borrow_mut();
            let entry = match installers.get_mut(idx) {
                Some(e) => e,
                None => continue,
            };
            if first_err.is_some() {
                let _ = entry.installer_mut().abort();
                continue;
            }
            let result = entry.installer_mut().finalize();
            if let Err(e) = entry.latch(result) {
                first_err = Some(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        self.tracker.set_holds_content(self.update_index);
        self.persist_metadata(self.update_index as u32, self.boot_index as u32)
    }

    fn copy_forward_untouched_locations(&mut self) -> Result<(), AgentError> {
        let untouched: Vec<u32> = {
            let installers = self.installers.borrow();
            let touched: Vec<u32> = self
                .active_installers
                .iter()
                .filter_map(|&idx| installers.get(idx).map(|e| e.location_id))
                .collect();
            installers
                .distinct_location_ids()
                .filter(|loc| !touched.contains(loc))
                .collect()
        };

        for location_id in untouched {
            let copy_idx = {
                let installers = self.installers.borrow();
                installers.find_by_type_location(InstallType::WholeVolumeCopy, location_id)
            }
            .ok_or(AgentError::NotAvailable)?;

            let current_volume_id =
                banked_volume_id(location_id, banked_usage_id(self.boot_index));
            let update_volume_id =
                banked_volume_id(location_id, banked_usage_id(self.update_index));
            {
                let mut installers = self.installers.borrow_mut();
                let entry = installers.get_mut(copy_idx).ok_or(AgentError::Unknown)?;
                entry.installer_mut().begin(current_volume_id, update_volume_id)?;
                entry.installer_mut().finalize()?;
            }

            if let Some(fw_dir) = self.fw_directory.as_ref() {
                let image_indices: Vec<usize> = fw_dir
                    .iter()
                    .filter(|img| img.location_id == location_id)
                    .map(|img| img.image_index)
                    .collect();
                for image_index in image_indices {
                    self.tracker
                        .copy_accept(self.boot_index, self.update_index, image_index);
                }
            }
        }
        Ok(())
    }

    pub fn notify_accepted(&mut self, image: &ImageInfo) -> Result<bool, AgentError> {
        self.tracker.accept(self.boot_index, image.image_index);
        let fw_dir = self.fw_directory.as_ref().ok_or(AgentError::NotAvailable)?;
        let previous = fw_dir.boot_info.previous_active_index;
        let num_images = fw_dir.num_images();
        let all_accepted = self.tracker.is_all_accepted(self.boot_index, num_images);
        // Once every image in the active bank is accepted, the trial is
        // over: collapse `previous_active_index` onto `active_index` so a
        // later boot no longer reports a trial.
        let new_previous = if all_accepted { self.boot_index as u32 } else { previous };
        self.persist_metadata(self.boot_index as u32, new_previous)?;
        Ok(all_accepted)
    }

    pub fn revert_to_previous(&mut self) -> Result<(), AgentError> {
        let active_index = self
            .fw_directory
            .as_ref()
            .ok_or(AgentError::NotAvailable)?
            .boot_info
            .active_index as usize;

        ringbuf_entry!(Trace::Reverted);
        if active_index == self.boot_index {
            let previous_active_index = self
                .fw_directory
                .as_ref()
                .ok_or(AgentError::NotAvailable)?
                .boot_info
                .previous_active_index as usize;
            self.tracker.set_holds_accepted_content(previous_active_index);
            self.persist_metadata(previous_active_index as u32, active_index as u32)
        } else {
            self.persist_metadata(self.boot_index as u32, self.boot_index as u32)
        }
    }

    pub fn export(&mut self, uuid: &Uuid) -> Option<&[u8]> {
        if *uuid != well_known::METADATA {
            return None;
        }
        let (bytes, _) = self.manager.fetch();
        Some(bytes)
    }

    pub fn is_accepted(&self, image: &ImageInfo) -> bool {
        self.tracker.is_accepted(self.boot_index, image.image_index)
    }

    pub fn is_trial(&self) -> bool {
        let Some(fw_dir) = self.fw_directory.as_ref() else {
            return false;
        };
        fw_dir.boot_info.active_index as usize == self.boot_index
            && !self.tracker.is_all_accepted(self.boot_index, fw_dir.num_images())
    }

    /// No-op in this implementation; kept as an explicit documented hook for
    /// deployments whose bootloader needs a distinct "confirm" side effect
    /// beyond writing `active_index`.
    pub fn commit_to_update(&mut self) -> Result<(), AgentError> {
        Ok(())
    }
}
