// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Volume;
use fwu_types::AgentError;

/// Upper bound on the number of volumes a single deployment can register.
pub const VOLUME_INDEX_MAX_ENTRIES: usize = 8;

/// Process-wide `volume_id -> Volume` registry.
///
/// Populated once during deployment configuration and treated as read-only
/// (in the sense that entries are neither added nor removed) for the
/// lifetime of the agent; individual volumes are still opened, written and
/// closed through the index.
#[derive(Default)]
pub struct VolumeIndex {
    entries: Vec<(u32, Box<dyn Volume>)>,
}

impl VolumeIndex {
    pub fn new() -> Self {
        VolumeIndex {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, volume_id: u32, volume: Box<dyn Volume>) -> Result<(), AgentError> {
        if self.entries.len() >= VOLUME_INDEX_MAX_ENTRIES {
            return Err(AgentError::NotAvailable);
        }
        self.entries.push((volume_id, volume));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn find(&self, volume_id: u32) -> Option<&dyn Volume> {
        self.entries
            .iter()
            .find(|(id, _)| *id == volume_id)
            .map(|(_, v)| v.as_ref())
    }

    pub fn find_mut(&mut self, volume_id: u32) -> Option<&mut (dyn Volume + 'static)> {
        self.entries
            .iter_mut()
            .find(|(id, _)| *id == volume_id)
            .map(|(_, v)| v.as_mut())
    }
}
