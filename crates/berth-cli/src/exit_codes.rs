//! Process exit codes
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// Release reconciled
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// The release service rejected or failed an install or update
pub const RELEASE_ERROR: i32 = 3;

/// Chart missing or unreadable
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Credentials could not be resolved or the cluster could not be reached
pub const CONNECTION_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
