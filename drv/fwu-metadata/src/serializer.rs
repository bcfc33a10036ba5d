// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fwu_types::{AgentError, BankTracker, FwDirectory};
use fwu_volume::VolumeIndex;

/// Byte-exact encode/decode of FWU metadata.
///
/// A deployment fixes one implementation (v1 or v2) for the lifetime of the
/// agent (§4.4.1 of the design notes): which version a concrete bootloader
/// expects is a deployment-configuration decision, not something probed at
/// runtime by this trait.
pub trait MetadataSerializer {
    /// The `version` field this implementation writes and expects to read.
    fn version(&self) -> u32;

    /// Exact serialized length for `fw_dir`'s current image count.
    fn size(&self, fw_dir: &FwDirectory) -> usize;

    /// Upper bound on `size()` across any valid `FwDirectory`, used to size
    /// scratch buffers ahead of a `FwDirectory` being fully populated.
    fn max_size(&self) -> usize;

    /// Encodes metadata into `buf`, returning the number of bytes written.
    ///
    /// `buf[0..4]` (the `crc_32` field) is left as whatever `buf` already
    /// contained; the caller (`MetadataManager`) computes and fills it in
    /// afterwards, since the CRC covers everything *except* that field.
    ///
    /// `volumes`, if supplied, is used to look up each bank's per-image
    /// UUIDs via `Volume::storage_ids`; if `None` (or a lookup misses),
    /// the corresponding UUID fields are left nil, matching the "if
    /// unsupported, leave nil" encoding rule.
    fn serialize(
        &self,
        active_index: u32,
        previous_active_index: u32,
        fw_dir: &FwDirectory,
        tracker: &BankTracker,
        volumes: Option<&VolumeIndex>,
        buf: &mut [u8],
    ) -> Result<usize, AgentError>;

    /// Restores both banks' content/accepted state from `buf` into
    /// `tracker`. Aborts silently (tracker left in its pre-call state) on
    /// any bounds-check failure, since `buf` may be untrusted on-flash
    /// bytes.
    fn deserialize_bank_info(&self, tracker: &mut BankTracker, buf: &[u8]);

    /// Reads just `(active_index, previous_active_index)` from `buf`,
    /// without touching a `BankTracker`. Returns `None` on a bounds-check
    /// failure.
    fn deserialize_active_indices(&self, buf: &[u8]) -> Option<(u32, u32)>;
}
