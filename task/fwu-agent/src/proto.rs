// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire shapes of the FWU-A client-facing request/response payloads.
//!
//! These are encode/decode-only: no IPC mechanism, wire framing, or server
//! loop binding them to a transport lives in this crate (§1 of the design
//! notes names that a host-environment concern). A host binding builds a
//! dispatch loop on top of [`crate::UpdateAgent`] that decodes one of these
//! per `func_id` and encodes `Result<T, fwu_types::AgentError>` into the
//! `{ i32 status; payload }` response envelope.

use zerocopy::byteorder::{LittleEndian, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

type LU16 = U16<LittleEndian>;
type LU32 = U32<LittleEndian>;
type LU64 = U64<LittleEndian>;

/// Function ids carried in the request envelope's `func_id`.
pub mod func_id {
    pub const DISCOVER: u32 = 0;
    pub const BEGIN_STAGING: u32 = 16;
    pub const END_STAGING: u32 = 17;
    pub const CANCEL_STAGING: u32 = 18;
    pub const OPEN: u32 = 19;
    pub const WRITE_STREAM: u32 = 20;
    pub const READ_STREAM: u32 = 21;
    pub const COMMIT: u32 = 22;
    pub const ACCEPT_IMAGE: u32 = 23;
    pub const SELECT_PREVIOUS: u32 = 24;
}

/// `op_type` carried in an `open` request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OpType {
    Read = 0,
    Write = 1,
}

impl OpType {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(OpType::Read),
            1 => Some(OpType::Write),
            _ => None,
        }
    }
}

/// Fixed-size fields of the `discover` response; `function_presence` is a
/// caller-sized trailer of one byte per advertised function id, appended
/// after this header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct DiscoverResponseHeader {
    pub service_status: zerocopy::byteorder::I16<LittleEndian>,
    pub ver_major: u8,
    pub ver_minor: u8,
    pub off_function_presence: LU16,
    pub num_func: LU16,
    pub max_payload_size: LU64,
    pub flags: LU32,
    pub vendor_flags: LU32,
}

pub const DISCOVER_VER_MAJOR: u8 = 1;
pub const DISCOVER_VER_MINOR: u8 = 0;

/// Fixed-size fields of a `begin_staging` request; `update_guid` is a
/// caller-sized trailer of `partial_update_count` 16-byte mixed-endian
/// GUIDs.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BeginStagingRequestHeader {
    pub reserved: LU32,
    pub vendor_flags: LU32,
    pub partial_update_count: LU32,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct OpenRequest {
    pub img_type_uuid: [u8; 16],
    pub op_type: u8,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct OpenResponse {
    pub handle: LU32,
}

/// Fixed-size fields of a `write_stream` request; `payload` is a
/// caller-sized trailer of `data_len` bytes.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct WriteStreamRequestHeader {
    pub handle: LU32,
    pub data_len: LU32,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct ReadStreamRequest {
    pub handle: LU32,
}

/// Fixed-size fields of a `read_stream` response; `payload` is a
/// caller-sized trailer of `read_bytes` bytes.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct ReadStreamResponseHeader {
    pub read_bytes: LU32,
    pub total_bytes: LU32,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct CommitRequest {
    pub handle: LU32,
    pub acceptance_req: LU32,
    pub max_atomic_len: LU32,
}

impl CommitRequest {
    /// `acceptance_req == 0` means "accepted on commit"; `1` means the
    /// client must follow up with an explicit `accept_image`.
    pub fn accepted_on_commit(&self) -> bool {
        self.acceptance_req.get() == 0
    }
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct CommitResponse {
    pub progress: LU32,
    pub total_work: LU32,
}

impl CommitResponse {
    /// The agent only ever performs synchronous commits (§5: no suspension
    /// points inside a core operation), so this is always `(1, 1)`.
    pub const SYNCHRONOUS_COMPLETE: CommitResponse = CommitResponse {
        progress: LU32::new(1),
        total_work: LU32::new(1),
    };
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct AcceptImageRequest {
    pub reserved: LU32,
    pub img_type_uuid: [u8; 16],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_request_decodes_acceptance_flag() {
        let req = CommitRequest {
            handle: LU32::new(1),
            acceptance_req: LU32::new(0),
            max_atomic_len: LU32::new(0),
        };
        assert!(req.accepted_on_commit());
        let req2 = CommitRequest {
            acceptance_req: LU32::new(1),
            ..req
        };
        assert!(!req2.accepted_on_commit());
    }

    #[test]
    fn open_request_round_trips_bytes() {
        let req = OpenRequest {
            img_type_uuid: [7u8; 16],
            op_type: 1,
        };
        let bytes = req.as_bytes();
        let decoded = OpenRequest::read_from_bytes(bytes).unwrap();
        assert_eq!(decoded.img_type_uuid, [7u8; 16]);
        assert_eq!(decoded.op_type, 1);
    }
}
