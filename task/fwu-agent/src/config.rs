// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wires a parsed [`fwu_config::DeploymentConfig`]'s metadata section into a
//! [`BankedFwStore`]. Selecting which `Volume`/`Installer` instances back
//! each `fwu_config::LocationConfig` remains the host binding's job (it
//! owns the concrete storage); this module only resolves the
//! deployment-fixed metadata serializer and volume ids.

use fwu_installer::InstallerIndex;
use fwu_metadata::{MetadataSerializer, MetadataSerializerV1, MetadataSerializerV2};
use fwu_store::BankedFwStore;
use fwu_volume::VolumeIndex;
use std::cell::RefCell;
use std::rc::Rc;

static SERIALIZER_V1: MetadataSerializerV1 = MetadataSerializerV1;
static SERIALIZER_V2: MetadataSerializerV2 = MetadataSerializerV2;

/// Resolves a configured metadata version to its (statically dispatched)
/// serializer. The version is fixed for the device's lifetime (§4.4.1), so
/// a `'static` reference to one of the two process-wide instances is all
/// `BankedFwStore` needs.
pub fn serializer_for(version: fwu_config::MetadataVersion) -> &'static dyn MetadataSerializer {
    match version {
        fwu_config::MetadataVersion::V1 => &SERIALIZER_V1,
        fwu_config::MetadataVersion::V2 => &SERIALIZER_V2,
    }
}

/// Builds a `BankedFwStore` from a deployment's `[metadata]` table plus the
/// process-wide volume/installer registries the host has already
/// populated.
pub fn build_store(
    config: &fwu_config::MetadataConfig,
    volumes: Rc<RefCell<VolumeIndex>>,
    installers: Rc<RefCell<InstallerIndex>>,
) -> BankedFwStore {
    BankedFwStore::new(
        volumes,
        installers,
        serializer_for(config.serializer_version),
        config.primary_volume_id,
        config.backup_volume_id,
    )
}
