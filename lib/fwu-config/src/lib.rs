// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deployment configuration for a concrete FWU agent: which locations,
//! volumes, installers and metadata version a device wires up, loaded from
//! TOML ahead of constructing the agent.
//!
//! This crate performs no IO beyond `toml::from_str`; wiring the parsed
//! configuration into live `Volume`/`Installer` instances (physical volume
//! construction, installer registration) remains a deployment concern.

use fwu_types::InstallType;
use serde::Deserialize;

/// Top-level deployment configuration: one `[metadata]` table plus zero or
/// more `[[locations]]` entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentConfig {
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

/// Which metadata volumes back this deployment's `MetadataManager`, and
/// which on-wire version its bootloader expects.
///
/// Per §4.4.1 of the design notes, the serializer version is fixed for the
/// lifetime of a device; this struct is the deployment-configuration
/// decision that feeds `MetadataSerializer::select`-equivalent wiring at
/// agent construction time, rather than anything probed at runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataConfig {
    pub serializer_version: MetadataVersion,
    pub primary_volume_id: Option<u32>,
    pub backup_volume_id: Option<u32>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataVersion {
    V1,
    V2,
}

impl MetadataVersion {
    pub const fn as_wire_version(self) -> u32 {
        match self {
            MetadataVersion::V1 => 1,
            MetadataVersion::V2 => 2,
        }
    }
}

/// A single logical firmware location: its two bank volumes and which
/// installer strategy handles it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocationConfig {
    pub id: u32,
    pub name: String,
    pub install_type: InstallTypeConfig,
    pub bank_a_volume_id: u32,
    pub bank_b_volume_id: u32,
}

/// Config-schema mirror of [`fwu_types::InstallType`] (kept distinct so the
/// wire/runtime enum doesn't need to derive `serde::Deserialize`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallTypeConfig {
    WholeVolume,
    SubVolume,
    WholeVolumeCopy,
}

impl From<InstallTypeConfig> for InstallType {
    fn from(value: InstallTypeConfig) -> Self {
        match value {
            InstallTypeConfig::WholeVolume => InstallType::WholeVolume,
            InstallTypeConfig::SubVolume => InstallType::SubVolume,
            InstallTypeConfig::WholeVolumeCopy => InstallType::WholeVolumeCopy,
        }
    }
}

impl DeploymentConfig {
    /// Parses a deployment configuration from its TOML source.
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [metadata]
        serializer-version = "v2"
        primary-volume-id = 0xffff_0000
        backup-volume-id = 0xffff_0001

        [[locations]]
        id = 0
        name = "ap-firmware"
        install-type = "whole-volume"
        bank-a-volume-id = 0x0000_0000
        bank-b-volume-id = 0x0000_0001

        [[locations]]
        id = 1
        name = "scp-firmware"
        install-type = "whole-volume-copy"
        bank-a-volume-id = 0x0001_0000
        bank-b-volume-id = 0x0001_0001
    "#;

    #[test]
    fn parses_locations_and_metadata() {
        let cfg = DeploymentConfig::from_toml(EXAMPLE).unwrap();
        assert_eq!(cfg.metadata.serializer_version, MetadataVersion::V2);
        assert_eq!(cfg.metadata.primary_volume_id, Some(0xffff_0000));
        assert_eq!(cfg.locations.len(), 2);
        assert_eq!(cfg.locations[0].name, "ap-firmware");
        assert_eq!(
            InstallType::from(cfg.locations[1].install_type),
            InstallType::WholeVolumeCopy
        );
    }

    #[test]
    fn missing_metadata_table_fails_to_parse() {
        assert!(DeploymentConfig::from_toml("").is_err());
    }

    #[test]
    fn wire_version_matches_variant() {
        assert_eq!(MetadataVersion::V1.as_wire_version(), 1);
        assert_eq!(MetadataVersion::V2.as_wire_version(), 2);
    }
}
