// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Volume;
use fwu_types::{AgentError, Uuid};

/// An in-memory, fixed-capacity `Volume` backing tests and local
/// experimentation.
///
/// `write` fails with [`AgentError::OutOfBounds`] once the requested write
/// would exceed the configured capacity, mirroring a real flash partition's
/// fixed size. `erase` resets the whole buffer to `0xff`, matching NOR-flash
/// erase semantics.
pub struct RamVolume {
    data: Vec<u8>,
    cursor: usize,
    is_open: bool,
    storage_ids: Option<(Uuid, Uuid)>,
}

impl RamVolume {
    pub fn new(capacity: usize) -> Self {
        RamVolume {
            data: vec![0xffu8; capacity],
            cursor: 0,
            is_open: false,
            storage_ids: None,
        }
    }

    /// Attaches the `(partition, parent)` uuid pair this volume reports via
    /// `storage_ids`, for tests that exercise the v2 serializer's per-image
    /// UUID lookup.
    pub fn with_storage_ids(mut self, partition: Uuid, parent: Uuid) -> Self {
        self.storage_ids = Some((partition, parent));
        self
    }

    /// Direct, unchecked access to the backing bytes, for test assertions.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

impl Volume for RamVolume {
    fn open(&mut self) -> Result<(), AgentError> {
        self.is_open = true;
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AgentError> {
        self.is_open = false;
        Ok(())
    }

    fn size(&mut self) -> Result<usize, AgentError> {
        Ok(self.data.len())
    }

    fn seek(&mut self, offset: usize) -> Result<(), AgentError> {
        if offset > self.data.len() {
            return Err(AgentError::OutOfBounds);
        }
        self.cursor = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AgentError> {
        let available = self.data.len().saturating_sub(self.cursor);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, AgentError> {
        if self.cursor + buf.len() > self.data.len() {
            return Err(AgentError::OutOfBounds);
        }
        self.data[self.cursor..self.cursor + buf.len()].copy_from_slice(buf);
        self.cursor += buf.len();
        Ok(buf.len())
    }

    fn erase(&mut self) -> Result<(), AgentError> {
        self.data.fill(0xff);
        self.cursor = 0;
        Ok(())
    }

    fn storage_ids(&self) -> Option<(Uuid, Uuid)> {
        self.storage_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_exactly_at_capacity_succeeds() {
        let mut v = RamVolume::new(16);
        v.open().unwrap();
        assert_eq!(v.write(&[1u8; 16]).unwrap(), 16);
    }

    #[test]
    fn write_past_capacity_fails_out_of_bounds() {
        let mut v = RamVolume::new(16);
        v.open().unwrap();
        assert_eq!(v.write(&[1u8; 17]), Err(AgentError::OutOfBounds));
    }

    #[test]
    fn erase_resets_to_0xff() {
        let mut v = RamVolume::new(4);
        v.open().unwrap();
        v.write(&[0u8; 4]).unwrap();
        v.erase().unwrap();
        assert_eq!(v.contents(), [0xff; 4]);
    }

    #[test]
    fn seek_then_read_reflects_prior_write() {
        let mut v = RamVolume::new(8);
        v.open().unwrap();
        v.write(b"abcdefgh").unwrap();
        v.seek(2).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(v.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"cde");
    }
}
