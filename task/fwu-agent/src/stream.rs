// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `StreamManager` (C8 helper): a fixed-size pool of client-visible read and
//! write streams, recycling the least-recently-used slot on exhaustion.

use fwu_ringbuf::{ringbuf, ringbuf_entry};
use fwu_store::BankedFwStore;
use fwu_types::{AgentError, ImageInfo};

/// Default pool size (`FWU_STREAM_MANAGER_POOL_SIZE`).
pub const FWU_STREAM_MANAGER_POOL_SIZE: usize = 4;

/// Identity tag used to dedupe a freshly-opened buffer stream against one
/// already open over "the same" underlying data (§4.7.2: closing a stale
/// buffer stream before a fresh read of the same object replaces it).
///
/// Only `Metadata` is deduped this way: the raw metadata object is small
/// and reopened for one-shot reads, so replacing a stale snapshot is safe.
/// `ImageDirectory` is exempt — two clients may legitimately hold
/// concurrent reads over it, and evicting one on the other's open would
/// break that.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BufferSource {
    ImageDirectory,
    Metadata,
}

/// Which kind of stream a handle refers to, used by `cancel_streams` /
/// `is_open_streams`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StreamKind {
    Buffer,
    Install,
}

enum Slot {
    Free,
    Buffer {
        handle: u32,
        source: Option<BufferSource>,
        data: Vec<u8>,
        position: usize,
    },
    Install {
        handle: u32,
        installer_idx: usize,
        image: ImageInfo,
    },
}

impl Slot {
    fn handle(&self) -> Option<u32> {
        match self {
            Slot::Free => None,
            Slot::Buffer { handle, .. } => Some(*handle),
            Slot::Install { handle, .. } => Some(*handle),
        }
    }

    fn kind(&self) -> Option<StreamKind> {
        match self {
            Slot::Free => None,
            Slot::Buffer { .. } => Some(StreamKind::Buffer),
            Slot::Install { .. } => Some(StreamKind::Install),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Opened { slot: u16, kind_is_install: bool },
    Evicted { slot: u16 },
    Closed { slot: u16 },
}

ringbuf!(Trace, 16, Trace::None);

/// Fixed-size pool of `FWU_STREAM_MANAGER_POOL_SIZE` stream slots. `order`
/// tracks slot indices from most- to least-recently-used among the
/// currently open slots; the tail is evicted first.
pub struct StreamManager {
    slots: Vec<Slot>,
    order: Vec<usize>,
    next_counter: u16,
}

impl StreamManager {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(FWU_STREAM_MANAGER_POOL_SIZE);
        for _ in 0..FWU_STREAM_MANAGER_POOL_SIZE {
            slots.push(Slot::Free);
        }
        StreamManager {
            slots,
            order: Vec::new(),
            next_counter: 0,
        }
    }

    fn split_handle(handle: u32) -> (usize, u16) {
        ((handle & 0xffff) as usize, (handle >> 16) as u16)
    }

    fn make_handle(slot_index: usize, counter: u16) -> u32 {
        (slot_index as u32) | ((counter as u32) << 16)
    }

    fn touch(&mut self, slot_index: usize) {
        self.order.retain(|&i| i != slot_index);
        self.order.insert(0, slot_index);
    }

    fn free_slot(&mut self, slot_index: usize) {
        self.slots[slot_index] = Slot::Free;
        self.order.retain(|&i| i != slot_index);
    }

    /// Evicts and closes `slot_index`'s stream, committing an install
    /// stream as `accepted=false` (§4.7.2 eviction semantics), then frees
    /// the slot.
    fn evict(&mut self, slot_index: usize, fw_store: &mut BankedFwStore) {
        ringbuf_entry!(Trace::Evicted { slot: slot_index as u16 });
        if let Slot::Install { installer_idx, image, .. } = &self.slots[slot_index] {
            let _ = fw_store.commit_image(*installer_idx, image, false);
        }
        self.free_slot(slot_index);
    }

    fn allocate_slot(&mut self, fw_store: &mut BankedFwStore) -> usize {
        if let Some(free) = (0..self.slots.len()).find(|&i| matches!(self.slots[i], Slot::Free)) {
            return free;
        }
        let lru = *self
            .order
            .last()
            .expect("pool nonempty, so some slot must be in use");
        self.evict(lru, fw_store);
        lru
    }

    fn lookup(&self, handle: u32) -> Result<usize, AgentError> {
        let (slot_index, counter) = Self::split_handle(handle);
        let slot = self.slots.get(slot_index).ok_or(AgentError::Unknown)?;
        match slot.handle() {
            Some(stored) if stored == Self::make_handle(slot_index, counter) => Ok(slot_index),
            _ => Err(AgentError::Unknown),
        }
    }

    /// Opens a read-only stream over `data`. If a `Metadata` buffer stream
    /// is already open, it is evicted first (a fresh read always replaces
    /// the previous snapshot of that object); `ImageDirectory` opens are
    /// never deduped this way, since concurrent reads over the image
    /// directory must coexist.
    pub fn open_buffer_stream(
        &mut self,
        fw_store: &mut BankedFwStore,
        data: Vec<u8>,
        source: Option<BufferSource>,
    ) -> u32 {
        if let Some(BufferSource::Metadata) = source {
            if let Some(existing) = self.slots.iter().position(|s| {
                matches!(s, Slot::Buffer { source: Some(BufferSource::Metadata), .. })
            }) {
                self.free_slot(existing);
            }
        }
        let slot_index = self.allocate_slot(fw_store);
        let counter = self.next_counter;
        self.next_counter = self.next_counter.wrapping_add(1);
        let handle = Self::make_handle(slot_index, counter);
        self.slots[slot_index] = Slot::Buffer {
            handle,
            source,
            data,
            position: 0,
        };
        self.touch(slot_index);
        ringbuf_entry!(Trace::Opened {
            slot: slot_index as u16,
            kind_is_install: false
        });
        handle
    }

    /// Opens a write stream against an already-`select_installer`'d
    /// installer. If an install stream is already open for this exact
    /// `installer_idx`, it is evicted first.
    pub fn open_install_stream(
        &mut self,
        fw_store: &mut BankedFwStore,
        installer_idx: usize,
        image: ImageInfo,
    ) -> u32 {
        if let Some(existing) = self.slots.iter().position(
            |s| matches!(s, Slot::Install { installer_idx: idx, .. } if *idx == installer_idx),
        ) {
            self.evict(existing, fw_store);
        }
        let slot_index = self.allocate_slot(fw_store);
        let counter = self.next_counter;
        self.next_counter = self.next_counter.wrapping_add(1);
        let handle = Self::make_handle(slot_index, counter);
        self.slots[slot_index] = Slot::Install {
            handle,
            installer_idx,
            image,
        };
        self.touch(slot_index);
        ringbuf_entry!(Trace::Opened {
            slot: slot_index as u16,
            kind_is_install: true
        });
        handle
    }

    /// Reads up to `buf.len()` bytes from a buffer stream, returning
    /// `(read_bytes, total_bytes)`. Legal only on buffer streams.
    pub fn read(&mut self, handle: u32, buf: &mut [u8]) -> Result<(usize, usize), AgentError> {
        let slot_index = self.lookup(handle)?;
        self.touch(slot_index);
        match &mut self.slots[slot_index] {
            Slot::Buffer { data, position, .. } => {
                let total = data.len();
                let remaining = &data[*position..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                *position += n;
                Ok((n, total))
            }
            _ => Err(AgentError::Denied),
        }
    }

    /// Writes a chunk to an install stream, delegating to
    /// `fw_store.write_image`. Legal only on install streams.
    pub fn write(
        &mut self,
        handle: u32,
        fw_store: &mut BankedFwStore,
        bytes: &[u8],
    ) -> Result<(), AgentError> {
        let slot_index = self.lookup(handle)?;
        self.touch(slot_index);
        match &self.slots[slot_index] {
            Slot::Install { installer_idx, .. } => fw_store.write_image(*installer_idx, bytes),
            _ => Err(AgentError::Denied),
        }
    }

    /// Closes `handle`. For an install stream this commits via
    /// `fw_store.commit_image(installer, image, accepted)`; for a buffer
    /// stream it simply frees the slot.
    pub fn close(
        &mut self,
        handle: u32,
        fw_store: &mut BankedFwStore,
        accepted: bool,
    ) -> Result<(), AgentError> {
        let slot_index = self.lookup(handle)?;
        let result = match &self.slots[slot_index] {
            Slot::Install { installer_idx, image, .. } => {
                fw_store.commit_image(*installer_idx, image, accepted)
            }
            Slot::Buffer { .. } | Slot::Free => Ok(()),
        };
        self.free_slot(slot_index);
        ringbuf_entry!(Trace::Closed { slot: slot_index as u16 });
        result
    }

    /// Closes every open stream of `kind`, committing install streams with
    /// `accepted=false` and swallowing any resulting error (used by
    /// idempotent recovery paths, not surfaced to the caller).
    pub fn cancel_streams(&mut self, fw_store: &mut BankedFwStore, kind: StreamKind) {
        let handles: Vec<u32> = self
            .slots
            .iter()
            .filter(|s| s.kind() == Some(kind))
            .filter_map(|s| s.handle())
            .collect();
        for handle in handles {
            let _ = self.close(handle, fw_store, false);
        }
    }

    pub fn is_open_streams(&self, kind: StreamKind) -> bool {
        self.slots.iter().any(|s| s.kind() == Some(kind))
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}
