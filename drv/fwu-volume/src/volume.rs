// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fwu_types::{AgentError, Uuid};

/// A seekable, erasable byte region corresponding to a partition on
/// persistent storage.
///
/// Real deployments back this with a block or flash driver; this workspace
/// only provides [`crate::RamVolume`] for tests and local experimentation.
pub trait Volume {
    fn open(&mut self) -> Result<(), AgentError>;
    fn close(&mut self) -> Result<(), AgentError>;
    fn size(&mut self) -> Result<usize, AgentError>;
    fn seek(&mut self, offset: usize) -> Result<(), AgentError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AgentError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, AgentError>;
    fn erase(&mut self) -> Result<(), AgentError>;

    /// Returns `(partition uuid, parent/location uuid)` if this volume
    /// implementation can report them; `None` if unsupported.
    fn storage_ids(&self) -> Option<(Uuid, Uuid)> {
        None
    }
}
