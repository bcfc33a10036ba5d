// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Installer` trait (C3) and its registry, plus the three concrete
//! installer strategies: whole-volume raw, whole-volume copy, and a minimal
//! sub-volume test double.

mod index;
mod sub_volume;
mod whole_volume;
mod whole_volume_copy;

pub use index::{InstallerIndex, INSTALLER_INDEX_LIMIT, INSTALLER_INDEX_LOCATION_ID_LIMIT};
pub use sub_volume::SubVolumeInstaller;
pub use whole_volume::WholeVolumeInstaller;
pub use whole_volume_copy::{WholeVolumeCopyInstaller, COPY_CHUNK_SIZE};

use fwu_types::{AgentError, FwDirectory, ImageInfo};

/// Strategy for placing an image's bytes into a target volume.
///
/// Implementations resolve the volume ids passed to `begin` against the
/// shared [`fwu_volume::VolumeIndex`] they were constructed with; the trait
/// itself never takes a volume-index parameter directly, matching the
/// banked store's "borrowed by id, threaded through the constructor"
/// registry discipline.
pub trait Installer {
    /// Opens the current (boot) and update volumes for this transaction.
    fn begin(
        &mut self,
        current_volume_id: u32,
        update_volume_id: u32,
    ) -> Result<(), AgentError>;

    /// Completes whatever work this installer defers to transaction end
    /// (only [`WholeVolumeCopyInstaller`] does anything here).
    fn finalize(&mut self) -> Result<(), AgentError>;

    /// Abandons the in-progress install, leaving the update volume in
    /// whatever state it was left in (the bank is already marked
    /// `no_content` by the store, so a half-written volume is harmless).
    fn abort(&mut self) -> Result<(), AgentError>;

    /// Prepares to receive bytes for `image_info`.
    fn open(&mut self, image_info: &ImageInfo) -> Result<(), AgentError>;

    /// Appends a chunk of streamed image bytes.
    fn write(&mut self, buf: &[u8]) -> Result<(), AgentError>;

    /// Closes out the current image's write stream.
    fn commit(&mut self) -> Result<(), AgentError>;

    /// Appends synthesized [`ImageInfo`] entries for images this installer
    /// can see on `volume_id`, for first-boot directory population.
    fn enumerate(&mut self, volume_id: u32, dir: &mut FwDirectory) -> Result<(), AgentError>;
}
