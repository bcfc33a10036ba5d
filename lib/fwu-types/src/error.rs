// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

/// Status codes of the FWU-A service interface.
///
/// These discriminants are wire-visible (encoded directly as the response
/// header's `i32 status`) and fixed by the protocol's status-code table.
/// DO NOT REORDER.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum AgentError {
    Unknown = -1,
    Busy = -2,
    OutOfBounds = -3,
    AuthFail = -4,
    NoPermission = -5,
    Denied = -6,
    Resume = -7,
    NotAvailable = -8,
}

impl AgentError {
    /// The wire value of the SUCCESS status, for response headers. `AgentError`
    /// itself has no `Success` variant since `Result::Ok` already carries that.
    pub const SUCCESS: i32 = 0;

    pub const fn status_code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AgentError::Unknown => "unknown",
            AgentError::Busy => "busy",
            AgentError::OutOfBounds => "out of bounds",
            AgentError::AuthFail => "authentication failure",
            AgentError::NoPermission => "no permission",
            AgentError::Denied => "denied",
            AgentError::Resume => "resume",
            AgentError::NotAvailable => "not available",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for AgentError {}
