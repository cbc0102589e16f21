//! Exit codes for the `gatepost` binary.
//! These codes are part of the public contract; scripts and CI gates depend on them.

use gatepost_authz::AuthzError;

pub const SUCCESS: i32 = 0;
pub const COMMAND_FAILED: i32 = 1; // Unexpected I/O or serialization failure
pub const CONFIG_ERROR: i32 = 2; // Bad config, arguments or policy input
pub const REJECTED: i32 = 3; // Token rejected
pub const KEYS_UNAVAILABLE: i32 = 4; // Issuer key set could not be fetched

/// Exit code for a library error; the mapping lives on [`AuthzError::exit_code`].
pub fn from_error(err: &AuthzError) -> i32 {
    err.exit_code()
}
