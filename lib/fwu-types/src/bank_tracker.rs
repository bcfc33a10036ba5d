// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{BANK_SCHEME_NUM_BANKS, FWU_MAX_FW_DIRECTORY_ENTRIES};

/// Per-bank in-memory state: whether the bank currently holds installed
/// content, and (if so) which of its images the client has accepted.
///
/// `set_no_content`/`set_holds_accepted_content` operate over the entire
/// fixed-size `is_accepted` array, not just the directory's live image
/// count, matching the reference tracker's whole-struct `memset`/fill
/// operations.
///
/// Invariant: `!is_content ⇒ all is_accepted == false`.
#[derive(Clone, Copy, Debug, Default)]
struct Bank {
    is_content: bool,
    is_accepted: [bool; FWU_MAX_FW_DIRECTORY_ENTRIES],
}

/// Pure in-memory per-bank content-present and per-image-accepted state for
/// the two banks of the A/B scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct BankTracker {
    banks: [Bank; BANK_SCHEME_NUM_BANKS],
}

impl BankTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `img` accepted in `bank`.
    pub fn accept(&mut self, bank: usize, img: usize) {
        if let Some(b) = self.banks.get_mut(bank) {
            if let Some(flag) = b.is_accepted.get_mut(img) {
                *flag = true;
            }
        }
    }

    /// Copies exactly one image's accepted bit from `from_bank` to
    /// `to_bank`. Callers loop over images when a whole bank needs copying
    /// (mirroring the reference's one-image-at-a-time `copy_accept`).
    pub fn copy_accept(&mut self, from_bank: usize, to_bank: usize, img: usize) {
        let value = self
            .banks
            .get(from_bank)
            .and_then(|b| b.is_accepted.get(img))
            .copied()
            .unwrap_or(false);
        if let Some(b) = self.banks.get_mut(to_bank) {
            if let Some(flag) = b.is_accepted.get_mut(img) {
                *flag = value;
            }
        }
    }

    /// Clears `is_content` and every accepted flag for `bank`.
    pub fn set_no_content(&mut self, bank: usize) {
        if let Some(b) = self.banks.get_mut(bank) {
            b.is_content = false;
            b.is_accepted = [false; FWU_MAX_FW_DIRECTORY_ENTRIES];
        }
    }

    pub fn set_holds_content(&mut self, bank: usize) {
        if let Some(b) = self.banks.get_mut(bank) {
            b.is_content = true;
        }
    }

    /// Sets `is_content` and marks every one of the fixed-size accepted
    /// slots true, irrespective of how many images are actually populated
    /// in the live directory.
    pub fn set_holds_accepted_content(&mut self, bank: usize) {
        if let Some(b) = self.banks.get_mut(bank) {
            b.is_content = true;
            b.is_accepted = [true; FWU_MAX_FW_DIRECTORY_ENTRIES];
        }
    }

    pub fn is_content(&self, bank: usize) -> bool {
        self.banks.get(bank).is_some_and(|b| b.is_content)
    }

    pub fn is_accepted(&self, bank: usize, img: usize) -> bool {
        self.banks
            .get(bank)
            .and_then(|b| b.is_accepted.get(img))
            .copied()
            .unwrap_or(false)
    }

    /// `true` iff every image in `0..num_images` is accepted in `bank`;
    /// short-circuits on the first unaccepted image.
    pub fn is_all_accepted(&self, bank: usize, num_images: usize) -> bool {
        (0..num_images).all(|img| self.is_accepted(bank, img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_content_clears_accepted_flags() {
        let mut t = BankTracker::new();
        t.set_holds_accepted_content(0);
        assert!(t.is_all_accepted(0, FWU_MAX_FW_DIRECTORY_ENTRIES));
        t.set_no_content(0);
        assert!(!t.is_content(0));
        assert!(!t.is_accepted(0, 0));
    }

    #[test]
    fn copy_accept_moves_one_image_at_a_time() {
        let mut t = BankTracker::new();
        t.accept(0, 3);
        assert!(!t.is_accepted(1, 3));
        t.copy_accept(0, 1, 3);
        assert!(t.is_accepted(1, 3));
        assert!(!t.is_accepted(1, 4));
    }

    #[test]
    fn is_all_accepted_short_circuits() {
        let mut t = BankTracker::new();
        t.accept(0, 0);
        t.accept(0, 2);
        assert!(!t.is_all_accepted(0, 3));
        t.accept(0, 1);
        assert!(t.is_all_accepted(0, 3));
    }
}
