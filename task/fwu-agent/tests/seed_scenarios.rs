// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end coverage of the seed scenarios (§8), driven entirely through
//! `UpdateAgent`'s client-facing operations against `RamVolume`-backed
//! deployments.

use fwu_agent::{AgentState, OpType, UpdateAgent};
use fwu_installer::{InstallerIndex, WholeVolumeCopyInstaller, WholeVolumeInstaller};
use fwu_metadata::MetadataSerializerV1;
use fwu_store::BankedFwStore;
use fwu_types::{well_known, AgentError, FwDirectory, ImageInfo, ImagePermissions, InstallType, Uuid};
use fwu_volume::{banked_usage_id, banked_volume_id, RamVolume, VolumeIndex};
use std::cell::RefCell;
use std::rc::Rc;

const PRIMARY_META: u32 = 0xffff_0000;
const BACKUP_META: u32 = 0xffff_0001;
static SERIALIZER: MetadataSerializerV1 = MetadataSerializerV1;

fn image(uuid: Uuid, location_id: u32) -> ImageInfo {
    ImageInfo {
        img_type_uuid: uuid,
        max_size: 64,
        lowest_accepted_version: 0,
        active_version: 1,
        permissions: ImagePermissions::WRITABLE,
        image_index: 0,
        location_id,
        install_type: InstallType::WholeVolume,
    }
}

/// A single-location deployment: one `WholeVolume` installer over banks 0/1
/// of location 0, plus primary/backup metadata volumes.
struct SingleLocation {
    volumes: Rc<RefCell<VolumeIndex>>,
    installers: Rc<RefCell<InstallerIndex>>,
    uuid: Uuid,
}

impl SingleLocation {
    fn new() -> Self {
        let mut volumes = VolumeIndex::new();
        volumes.add(PRIMARY_META, Box::new(RamVolume::new(256))).unwrap();
        volumes.add(BACKUP_META, Box::new(RamVolume::new(256))).unwrap();
        volumes.add(banked_volume_id(0, banked_usage_id(0)), Box::new(RamVolume::new(64))).unwrap();
        volumes.add(banked_volume_id(0, banked_usage_id(1)), Box::new(RamVolume::new(64))).unwrap();
        let volumes = Rc::new(RefCell::new(volumes));

        let uuid = Uuid::from_u128(1);
        let mut installers = InstallerIndex::new();
        installers
            .add(
                InstallType::WholeVolume,
                0,
                Uuid::NIL,
                Box::new(WholeVolumeInstaller::new(Rc::clone(&volumes), 0)),
            )
            .unwrap();
        let installers = Rc::new(RefCell::new(installers));

        SingleLocation { volumes, installers, uuid }
    }

    fn directory(&self) -> FwDirectory {
        let mut dir = FwDirectory::new();
        dir.add_image_info(image(self.uuid, 0)).unwrap();
        dir
    }

    fn agent_booted_from(&self, boot_index: usize) -> UpdateAgent {
        let mut store = BankedFwStore::new(
            Rc::clone(&self.volumes),
            Rc::clone(&self.installers),
            &SERIALIZER,
            Some(PRIMARY_META),
            Some(BACKUP_META),
        );
        store.synchronize(self.directory(), boot_index).unwrap();
        UpdateAgent::new(store)
    }
}

// S1: a single-location update, staged and finalized, then accepted after
// the simulated reboot into the update bank.
#[test]
fn s1_single_location_update_reaches_regular_after_accept() {
    let deployment = SingleLocation::new();
    let mut agent = deployment.agent_booted_from(0);
    assert_eq!(agent.state(), AgentState::Regular);

    agent.begin_staging().unwrap();
    let handle = agent.open(&deployment.uuid, OpType::Write).unwrap();
    agent.write_stream(handle, b"new-firmware-bytes").unwrap();
    agent.commit(handle, false).unwrap();
    agent.end_staging().unwrap();

    // Bootloader picks up the newly-activated bank.
    let mut rebooted = deployment.agent_booted_from(1);
    assert_eq!(rebooted.state(), AgentState::Trial);

    rebooted.accept_image(&deployment.uuid).unwrap();
    assert_eq!(rebooted.state(), AgentState::Regular);

    // Outside `Trial` (including right after the transition out of it),
    // `accept_image` is denied.
    assert_eq!(rebooted.accept_image(&deployment.uuid), Err(AgentError::Denied));
}

// S2: a partial update touches only location 0; location 1 carries no
// image of its own and must be copy-forwarded by a `WholeVolumeCopy`
// installer so its bank B matches bank A byte-for-byte.
#[test]
fn s2_partial_update_copy_forwards_untouched_location() {
    let mut volumes = VolumeIndex::new();
    volumes.add(PRIMARY_META, Box::new(RamVolume::new(256))).unwrap();
    volumes.add(BACKUP_META, Box::new(RamVolume::new(256))).unwrap();
    for loc in [0u32, 1] {
        volumes.add(banked_volume_id(loc, banked_usage_id(0)), Box::new(RamVolume::new(64))).unwrap();
        volumes.add(banked_volume_id(loc, banked_usage_id(1)), Box::new(RamVolume::new(64))).unwrap();
    }
    let volumes = Rc::new(RefCell::new(volumes));

    // Seed location 1's active bank with content the copy installer should
    // carry forward untouched.
    {
        let mut v = volumes.borrow_mut();
        let bank_a = v.find_mut(banked_volume_id(1, banked_usage_id(0))).unwrap();
        bank_a.open().unwrap();
        bank_a.write(b"existing-loc1-content").unwrap();
        bank_a.close().unwrap();
    }

    let uuid0 = Uuid::from_u128(10);
    let mut installers = InstallerIndex::new();
    installers
        .add(
            InstallType::WholeVolume,
            0,
            Uuid::NIL,
            Box::new(WholeVolumeInstaller::new(Rc::clone(&volumes), 0)),
        )
        .unwrap();
    installers
        .add(
            InstallType::WholeVolumeCopy,
            1,
            Uuid::NIL,
            Box::new(WholeVolumeCopyInstaller::new(Rc::clone(&volumes))),
        )
        .unwrap();
    let installers = Rc::new(RefCell::new(installers));

    let mut dir = FwDirectory::new();
    dir.add_image_info(image(uuid0, 0)).unwrap();

    let mut store = BankedFwStore::new(
        Rc::clone(&volumes),
        Rc::clone(&installers),
        &SERIALIZER,
        Some(PRIMARY_META),
        Some(BACKUP_META),
    );
    store.synchronize(dir, 0).unwrap();
    let mut agent = UpdateAgent::new(store);

    agent.begin_staging().unwrap();
    let handle = agent.open(&uuid0, OpType::Write).unwrap();
    agent.write_stream(handle, b"loc0-update-bytes").unwrap();
    agent.commit(handle, true).unwrap();
    agent.end_staging().unwrap();
    assert_eq!(agent.state(), AgentState::TrialPending);

    let mut v = volumes.borrow_mut();
    let bank_b = v.find_mut(banked_volume_id(1, banked_usage_id(1))).unwrap();
    bank_b.open().unwrap();
    let mut buf = [0u8; 22];
    bank_b.read(&mut buf).unwrap();
    assert_eq!(&buf, b"existing-loc1-content");
}

// S3: the backup metadata copy is corrupted between updates (simulating a
// power failure between the primary and backup writes). A fresh agent must
// still boot correctly and repair the backup in place.
#[test]
fn s3_corrupted_backup_metadata_is_repaired_on_next_boot() {
    let deployment = SingleLocation::new();
    {
        let mut agent = deployment.agent_booted_from(0);
        agent.begin_staging().unwrap();
        let handle = agent.open(&deployment.uuid, OpType::Write).unwrap();
        agent.write_stream(handle, b"firmware-v2").unwrap();
        agent.commit(handle, false).unwrap();
        agent.end_staging().unwrap();
    }

    // Corrupt the backup copy in place, as if a power failure interrupted
    // the dual-copy write after the primary but before the backup.
    {
        let mut v = deployment.volumes.borrow_mut();
        let backup = v.find_mut(BACKUP_META).unwrap();
        backup.open().unwrap();
        backup.erase().unwrap();
        backup.write(&[0u8; 8]).unwrap();
        backup.close().unwrap();
    }

    let rebooted = deployment.agent_booted_from(1);
    assert_eq!(rebooted.state(), AgentState::Trial);
}

// S4: an oversize image write is rejected `OutOfBounds`; the client then
// cancels the transaction cleanly and can re-enter staging from scratch.
#[test]
fn s4_oversize_write_then_cancel_staging_recovers() {
    let deployment = SingleLocation::new();
    let mut agent = deployment.agent_booted_from(0);

    agent.begin_staging().unwrap();
    let handle = agent.open(&deployment.uuid, OpType::Write).unwrap();
    let oversize = vec![0xaa; 4096];
    assert_eq!(agent.write_stream(handle, &oversize), Err(AgentError::OutOfBounds));

    agent.cancel_staging().unwrap();
    assert_eq!(agent.state(), AgentState::Regular);

    // A clean re-entry into staging succeeds and can complete normally.
    agent.begin_staging().unwrap();
    let handle = agent.open(&deployment.uuid, OpType::Write).unwrap();
    agent.write_stream(handle, b"retry-bytes").unwrap();
    agent.commit(handle, false).unwrap();
    agent.end_staging().unwrap();
    assert_eq!(agent.state(), AgentState::TrialPending);
}

// S5: two independent image-directory reads, opened and drained in
// lockstep, see byte-identical content.
#[test]
fn s5_concurrent_image_directory_reads_are_byte_identical() {
    let deployment = SingleLocation::new();
    let mut agent = deployment.agent_booted_from(0);

    let handle_a = agent.open(&well_known::IMAGE_DIRECTORY, OpType::Read).unwrap();
    let handle_b = agent.open(&well_known::IMAGE_DIRECTORY, OpType::Read).unwrap();

    let mut buf_a = vec![0u8; 512];
    let mut buf_b = vec![0u8; 512];
    let (n_a, total_a) = agent.read_stream(handle_a, &mut buf_a).unwrap();
    let (n_b, total_b) = agent.read_stream(handle_b, &mut buf_b).unwrap();

    assert_eq!(total_a, total_b);
    assert_eq!(n_a, n_b);
    assert_eq!(buf_a[..n_a], buf_b[..n_b]);
}

// S6: the bootloader falls back to the previously-active bank (the staged
// update never actually ran). `synchronize` at the old boot index must
// reset both `active_index` and `previous_active_index` to it, and the
// agent never reports a trial.
#[test]
fn s6_bootloader_fallback_resyncs_to_previous_bank() {
    let deployment = SingleLocation::new();
    {
        let mut agent = deployment.agent_booted_from(0);
        agent.begin_staging().unwrap();
        let handle = agent.open(&deployment.uuid, OpType::Write).unwrap();
        agent.write_stream(handle, b"firmware-v2").unwrap();
        agent.commit(handle, false).unwrap();
        agent.end_staging().unwrap();
    }

    // The bootloader failed to select bank 1 and fell back to bank 0.
    let fallback = deployment.agent_booted_from(0);
    assert_eq!(fallback.state(), AgentState::Regular);
}
