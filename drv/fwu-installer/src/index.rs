// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Installer;
use fwu_ringbuf::{ringbuf, ringbuf_entry};
use fwu_types::{AgentError, InstallType, Uuid};

/// Upper bound on the number of installers a single deployment can register.
pub const INSTALLER_INDEX_LIMIT: usize = 8;

/// Upper bound on the number of *distinct* location ids an `InstallerIndex`
/// can enumerate, used by partial-update reasoning in `finalize_install`.
pub const INSTALLER_INDEX_LOCATION_ID_LIMIT: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Registered { install_type: InstallType, location_id: u32 },
    StatusLatched(AgentError),
}

ringbuf!(Trace, 16, Trace::None);

/// A registered installer plus the per-transaction bookkeeping the store
/// needs: which install type/location it serves, its latched error status,
/// and whether it is part of the current transaction's active set.
pub struct InstallerEntry {
    pub install_type: InstallType,
    pub location_id: u32,
    pub location_uuid: Uuid,
    install_status: Option<AgentError>,
    pub is_active: bool,
    installer: Box<dyn Installer>,
}

impl InstallerEntry {
    /// Latches `err` as this installer's status if none has been recorded
    /// yet this transaction; later errors are dropped, matching the
    /// reference "first error wins" accumulator.
    pub fn latch(&mut self, result: Result<(), AgentError>) -> Result<(), AgentError> {
        if let Err(err) = result {
            if self.install_status.is_none() {
                ringbuf_entry!(Trace::StatusLatched(err));
                self.install_status = Some(err);
            }
        }
        result
    }

    pub fn status(&self) -> Result<(), AgentError> {
        match self.install_status {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn reset_status(&mut self) {
        self.install_status = None;
    }

    pub fn installer_mut(&mut self) -> &mut dyn Installer {
        self.installer.as_mut()
    }
}

/// Registry of pluggable [`Installer`]s, keyed by `(install_type,
/// location_id)` and by `location_uuid`.
///
/// Populated once during deployment configuration; read (and its entries'
/// per-transaction state mutated) thereafter.
#[derive(Default)]
pub struct InstallerIndex {
    entries: Vec<InstallerEntry>,
}

impl InstallerIndex {
    pub fn new() -> Self {
        InstallerIndex { entries: Vec::new() }
    }

    pub fn add(
        &mut self,
        install_type: InstallType,
        location_id: u32,
        location_uuid: Uuid,
        installer: Box<dyn Installer>,
    ) -> Result<usize, AgentError> {
        if self.entries.len() >= INSTALLER_INDEX_LIMIT {
            return Err(AgentError::NotAvailable);
        }
        if self.distinct_location_ids().count() >= INSTALLER_INDEX_LOCATION_ID_LIMIT
            && !self.entries.iter().any(|e| e.location_id == location_id)
        {
            return Err(AgentError::NotAvailable);
        }
        ringbuf_entry!(Trace::Registered { install_type, location_id });
        let index = self.entries.len();
        self.entries.push(InstallerEntry {
            install_type,
            location_id,
            location_uuid,
            install_status: None,
            is_active: false,
            installer,
        });
        Ok(index)
    }

    pub fn find_by_type_location(
        &self,
        install_type: InstallType,
        location_id: u32,
    ) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.install_type == install_type && e.location_id == location_id)
    }

    pub fn find_by_location_uuid(&self, uuid: &Uuid) -> Option<usize> {
        self.entries.iter().position(|e| &e.location_uuid == uuid)
    }

    pub fn get(&self, index: usize) -> Option<&InstallerEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut InstallerEntry> {
        self.entries.get_mut(index)
    }

    /// The set of distinct location ids registered, in first-seen order.
    pub fn distinct_location_ids(&self) -> impl Iterator<Item = u32> + '_ {
        let mut seen: Vec<u32> = Vec::new();
        self.entries.iter().filter_map(move |e| {
            if seen.contains(&e.location_id) {
                None
            } else {
                seen.push(e.location_id);
                Some(e.location_id)
            }
        })
    }

    /// Clears every entry's per-transaction `is_active` flag and latched
    /// status, in preparation for a fresh `begin_staging`.
    pub fn reset_transaction(&mut self) {
        for entry in &mut self.entries {
            entry.is_active = false;
            entry.reset_status();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwu_types::ImageInfo;

    struct NullInstaller;
    impl Installer for NullInstaller {
        fn begin(&mut self, _: u32, _: u32) -> Result<(), AgentError> {
            Ok(())
        }
        fn finalize(&mut self) -> Result<(), AgentError> {
            Ok(())
        }
        fn abort(&mut self) -> Result<(), AgentError> {
            Ok(())
        }
        fn open(&mut self, _: &ImageInfo) -> Result<(), AgentError> {
            Ok(())
        }
        fn write(&mut self, _: &[u8]) -> Result<(), AgentError> {
            Ok(())
        }
        fn commit(&mut self) -> Result<(), AgentError> {
            Ok(())
        }
        fn enumerate(
            &mut self,
            _: u32,
            _: &mut fwu_types::FwDirectory,
        ) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[test]
    fn lookup_by_type_and_location() {
        let mut idx = InstallerIndex::new();
        idx.add(InstallType::WholeVolume, 0, Uuid::NIL, Box::new(NullInstaller))
            .unwrap();
        assert_eq!(idx.find_by_type_location(InstallType::WholeVolume, 0), Some(0));
        assert_eq!(idx.find_by_type_location(InstallType::WholeVolume, 1), None);
    }

    #[test]
    fn status_latches_first_error_only() {
        let mut idx = InstallerIndex::new();
        idx.add(InstallType::WholeVolume, 0, Uuid::NIL, Box::new(NullInstaller))
            .unwrap();
        let entry = idx.get_mut(0).unwrap();
        entry.latch(Err(AgentError::OutOfBounds)).unwrap_err();
        entry.latch(Err(AgentError::Unknown)).unwrap_err();
        assert_eq!(entry.status(), Err(AgentError::OutOfBounds));
    }

    #[test]
    fn distinct_location_ids_deduplicates() {
        let mut idx = InstallerIndex::new();
        idx.add(InstallType::WholeVolume, 0, Uuid::NIL, Box::new(NullInstaller))
            .unwrap();
        idx.add(InstallType::WholeVolumeCopy, 0, Uuid::NIL, Box::new(NullInstaller))
            .unwrap();
        idx.add(InstallType::WholeVolume, 1, Uuid::NIL, Box::new(NullInstaller))
            .unwrap();
        assert_eq!(idx.distinct_location_ids().collect::<Vec<_>>(), vec![0, 1]);
    }
}
