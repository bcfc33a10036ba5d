// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `UpdateAgent` (C8): the top-level FWU-A state machine, dispatching the
//! client-facing operations onto a `BankedFwStore` and a `StreamManager`.

use crate::img_dir;
use crate::proto;
use crate::stream::{BufferSource, StreamKind, StreamManager};
use fwu_ringbuf::{ringbuf, ringbuf_entry};
use fwu_store::BankedFwStore;
use fwu_types::{well_known, AgentError, Uuid};

/// States of the FWU-A client-facing state machine (§4.7).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AgentState {
    Uninitialised,
    Initialising,
    Regular,
    Staging,
    TrialPending,
    Trial,
}

/// Whether a client `open` requested a readable or writable stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpType {
    Read,
    Write,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Constructed { trial: bool },
    StateChanged(AgentState),
    OpenDenied { op: u8 },
    AcceptedImage { image_index: usize, all_accepted: bool },
}

ringbuf!(Trace, 16, Trace::None);

/// Dispatches the FWU-A client operations against one `BankedFwStore`,
/// tracking the staging/trial state machine and owning the stream pool.
///
/// Constructed once `fw_store.synchronize` has already been called by the
/// host binding (populating the boot's `FwDirectory`); the initial state is
/// derived from whether the store booted into an unaccepted trial.
pub struct UpdateAgent {
    fw_store: BankedFwStore,
    streams: StreamManager,
    state: AgentState,
}

impl UpdateAgent {
    pub fn new(fw_store: BankedFwStore) -> Self {
        let trial = fw_store.is_trial();
        let state = if trial { AgentState::Trial } else { AgentState::Regular };
        ringbuf_entry!(Trace::Constructed { trial });
        UpdateAgent {
            fw_store,
            streams: StreamManager::new(),
            state,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    fn set_state(&mut self, state: AgentState) {
        self.state = state;
        ringbuf_entry!(Trace::StateChanged(state));
    }

    /// `discover`: legal in every state. Returns the fixed header plus a
    /// `function_presence` trailer, one byte per function id this agent
    /// implements (all of them, in this workspace).
    pub fn discover(&self) -> (proto::DiscoverResponseHeader, Vec<u8>) {
        let ids = [
            proto::func_id::DISCOVER,
            proto::func_id::BEGIN_STAGING,
            proto::func_id::END_STAGING,
            proto::func_id::CANCEL_STAGING,
            proto::func_id::OPEN,
            proto::func_id::WRITE_STREAM,
            proto::func_id::READ_STREAM,
            proto::func_id::COMMIT,
            proto::func_id::ACCEPT_IMAGE,
            proto::func_id::SELECT_PREVIOUS,
        ];
        let function_presence: Vec<u8> = ids.iter().map(|_| 1u8).collect();
        let header = proto::DiscoverResponseHeader {
            service_status: zerocopy::byteorder::I16::new(AgentError::SUCCESS as i16),
            ver_major: proto::DISCOVER_VER_MAJOR,
            ver_minor: proto::DISCOVER_VER_MINOR,
            off_function_presence: zerocopy::byteorder::U16::new(
                core::mem::size_of::<proto::DiscoverResponseHeader>() as u16,
            ),
            num_func: zerocopy::byteorder::U16::new(function_presence.len() as u16),
            max_payload_size: zerocopy::byteorder::U64::new(u64::MAX),
            flags: zerocopy::byteorder::U32::new(0),
            vendor_flags: zerocopy::byteorder::U32::new(0),
        };
        (header, function_presence)
    }

    /// `begin_staging`: only legal from `Regular`; idempotently re-enters
    /// `Staging` if already there, discarding prior progress.
    pub fn begin_staging(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::Regular && self.state != AgentState::Staging {
            return Err(AgentError::Denied);
        }
        self.streams.cancel_streams(&mut self.fw_store, StreamKind::Install);
        if self.state == AgentState::Staging {
            self.fw_store.abort_install();
        }
        self.fw_store.begin_install()?;
        self.set_state(AgentState::Staging);
        Ok(())
    }

    /// `end_staging`: fails `Busy` while any install stream remains open.
    pub fn end_staging(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::Staging {
            return Err(AgentError::Denied);
        }
        if self.streams.is_open_streams(StreamKind::Install) {
            return Err(AgentError::Busy);
        }
        self.fw_store.finalize_install()?;
        self.set_state(AgentState::TrialPending);
        Ok(())
    }

    /// `cancel_staging`: discards any open install streams (accepted=false)
    /// and returns to `Regular` without finalizing.
    pub fn cancel_staging(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::Staging {
            return Err(AgentError::Denied);
        }
        self.streams.cancel_streams(&mut self.fw_store, StreamKind::Install);
        self.fw_store.abort_install();
        self.set_state(AgentState::Regular);
        Ok(())
    }

    /// `open` dispatch chain-of-responsibility (§4.7.1).
    pub fn open(&mut self, uuid: &Uuid, op: OpType) -> Result<u32, AgentError> {
        if uuid == &well_known::IMAGE_DIRECTORY {
            if op != OpType::Read {
                ringbuf_entry!(Trace::OpenDenied { op: 1 });
                return Err(AgentError::Denied);
            }
            let fw_dir = self.fw_store.fw_directory().ok_or(AgentError::NotAvailable)?;
            let bytes = img_dir::serialize(fw_dir, |idx| {
                fw_dir
                    .get(idx)
                    .map(|image| self.fw_store.is_accepted(image))
                    .unwrap_or(false)
            });
            let handle = self.streams.open_buffer_stream(
                &mut self.fw_store,
                bytes,
                Some(BufferSource::ImageDirectory),
            );
            return Ok(handle);
        }

        if let Some(bytes) = self.fw_store.export(uuid) {
            if op != OpType::Read {
                return Err(AgentError::Denied);
            }
            let bytes = bytes.to_vec();
            let handle =
                self.streams
                    .open_buffer_stream(&mut self.fw_store, bytes, Some(BufferSource::Metadata));
            return Ok(handle);
        }

        let image = self
            .fw_store
            .fw_directory()
            .and_then(|dir| dir.find_by_uuid(uuid))
            .copied();
        if let Some(image) = image {
            if self.state != AgentState::Staging {
                return Err(AgentError::Denied);
            }
            let installer_idx = self.fw_store.select_installer(&image)?;
            let handle = self.streams.open_install_stream(&mut self.fw_store, installer_idx, image);
            return Ok(handle);
        }

        Err(AgentError::Unknown)
    }

    /// `write_stream`: legal only on install streams, and only while
    /// `Staging` (the store itself also rejects writes against an installer
    /// it never activated).
    pub fn write_stream(&mut self, handle: u32, bytes: &[u8]) -> Result<(), AgentError> {
        if self.state != AgentState::Staging {
            return Err(AgentError::Denied);
        }
        self.streams.write(handle, &mut self.fw_store, bytes)
    }

    /// `read_stream`: legal in any state, buffer streams only.
    pub fn read_stream(&mut self, handle: u32, buf: &mut [u8]) -> Result<(usize, usize), AgentError> {
        self.streams.read(handle, buf)
    }

    /// `commit`: closes `handle`, legal in any state.
    pub fn commit(&mut self, handle: u32, accepted: bool) -> Result<(u32, u32), AgentError> {
        self.streams.close(handle, &mut self.fw_store, accepted)?;
        Ok((1, 1))
    }

    /// `accept_image`: only legal in `Trial`; transitions to `Regular` once
    /// every image in the active bank is accepted.
    pub fn accept_image(&mut self, img_type_uuid: &Uuid) -> Result<(), AgentError> {
        if self.state != AgentState::Trial {
            return Err(AgentError::Denied);
        }
        let image = self
            .fw_store
            .fw_directory()
            .and_then(|dir| dir.find_by_uuid(img_type_uuid))
            .copied()
            .ok_or(AgentError::Unknown)?;
        let all_accepted = self.fw_store.notify_accepted(&image)?;
        ringbuf_entry!(Trace::AcceptedImage {
            image_index: image.image_index,
            all_accepted
        });
        if all_accepted {
            self.set_state(AgentState::Regular);
        }
        Ok(())
    }

    /// `select_previous`: idempotent in `TrialPending`/`Trial`, reverts the
    /// boot selection to the previously-active bank.
    pub fn select_previous(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::TrialPending && self.state != AgentState::Trial {
            return Err(AgentError::Denied);
        }
        self.fw_store.revert_to_previous()?;
        self.set_state(AgentState::Regular);
        Ok(())
    }
}
