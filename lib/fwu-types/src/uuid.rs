// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The GUID mixed-endian octet form used throughout the FWU-A wire formats.
//!
//! The first three fields of a GUID are encoded little-endian on the wire
//! (matching the Microsoft/UEFI convention); the remainder is plain byte
//! order. [`Uuid`] stores its octets in the canonical RFC 4122 (big-endian)
//! order used by the [`uuid`] crate, and converts to/from the wire's
//! mixed-endian octets at the edges.

use std::fmt;

/// A 128-bit identifier, compared and displayed in canonical RFC 4122 order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Uuid(uuid::Uuid);

impl Uuid {
    pub const NIL: Uuid = Uuid(uuid::Uuid::nil());

    pub const fn from_u128(v: u128) -> Self {
        Uuid(uuid::Uuid::from_u128(v))
    }

    /// Parses 16 octets in GUID mixed-endian wire order (as found in the
    /// FWU metadata and protocol payloads).
    pub fn from_mixed_endian_bytes(mut bytes: [u8; 16]) -> Self {
        bytes[0..4].reverse();
        bytes[4..6].reverse();
        bytes[6..8].reverse();
        Uuid(uuid::Uuid::from_bytes(bytes))
    }

    /// Serializes back into 16 octets in GUID mixed-endian wire order.
    pub fn to_mixed_endian_bytes(self) -> [u8; 16] {
        let mut bytes = *self.0.as_bytes();
        bytes[0..4].reverse();
        bytes[4..6].reverse();
        bytes[6..8].reverse();
        bytes
    }

    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({})", self.0)
    }
}

impl std::str::FromStr for Uuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Uuid(uuid::Uuid::parse_str(s)?))
    }
}

/// Canonical well-known UUIDs from the FWU-A protocol.
pub mod well_known {
    use super::Uuid;

    /// Identifies the update agent service itself.
    pub const UPDATE_AGENT: Uuid = Uuid::from_u128(0x6823a8381b06470e97740cce8bfb53fd);

    /// Identifies the client-visible FWU Image Directory object.
    pub const IMAGE_DIRECTORY: Uuid = Uuid::from_u128(0xdeee58d951474ad3a29077666e2341a5);

    /// Identifies the raw FWU metadata object.
    pub const METADATA: Uuid = Uuid::from_u128(0x8a7a84a0838740f6ab41a8b9a5a60d23);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_endian_round_trip() {
        let original = well_known::UPDATE_AGENT;
        let wire = original.to_mixed_endian_bytes();
        assert_eq!(Uuid::from_mixed_endian_bytes(wire), original);
    }

    #[test]
    fn display_matches_canonical_string() {
        assert_eq!(
            well_known::UPDATE_AGENT.to_string(),
            "6823a838-1b06-470e-9774-0cce8bfb53fd"
        );
    }

    #[test]
    fn nil_is_all_zero_octets() {
        assert_eq!(Uuid::NIL.to_mixed_endian_bytes(), [0u8; 16]);
        assert!(Uuid::NIL.is_nil());
    }
}
