// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crc::{Algorithm, Crc};

/// The CRC-32 variant used by every FWU metadata copy: polynomial
/// `0xEDB88320` reflected (normal form `0x04C11DB7`), initial value `0`
/// (confirmed against the reference `crc32(0U, buf + 4, len - 4)` call site
/// rather than assumed from the "standard Ethernet CRC" label, which
/// normally pairs the same polynomial with an initial value of
/// `0xffff_ffff`), reflected input/output, final XOR `0xffff_ffff`.
///
/// No built-in `crc` crate constant matches this init/xorout pairing, hence
/// the custom `Algorithm`.
const FWU_METADATA_CRC32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0x0000_0000,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff,
    check: 0xd202_d277,
    residue: 0x0000_0000,
};

/// Computes the FWU metadata CRC over `buf`, which must already exclude the
/// leading `crc_32` field (i.e. callers pass `buf[4..len]`).
pub fn crc32(buf: &[u8]) -> u32 {
    static CRC: Crc<u32> = Crc::<u32>::new(&FWU_METADATA_CRC32);
    CRC.checksum(buf)
}
