//! Protocol-wide constants shared by every crate in the workspace.

use std::time::Duration;

pub const APP_NAME: &str = "LSNP";
pub const DEFAULT_PORT: u16 = 50999;
pub const DISCOVERY_PORT: u16 = 50999;
pub const MULTICAST_GROUP: &str = "224.0.0.251";
pub const BUFFER_SIZE: usize = 65535;
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_TTL_SECS: i64 = 3600;
pub const ACK_TIMEOUT: Duration = Duration::from_millis(2000);
pub const ACK_MAX_RETRIES: u32 = 3;
pub const ACK_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
pub const FILE_CHUNK_SIZE: usize = 1200;

/// Types excluded from the dispatcher's pretty-print gate in
/// `lsnp-dispatcher::dispatch::Dispatcher::handle`. None of the types listed
/// here ever reach that gate as things stand (only `PROFILE` does), so this
/// currently has no observable effect beyond documenting the exclusion list
/// the banner check is written against.
pub const DEFAULT_QUIET_TYPES: &[&str] = &["PING", "ACK", "FILE_RECEIVED", "REVOKE"];

/// Types for which a successful, addressed-to-us delivery gets an automatic
/// ACK reply and is tracked by the sender's ACK manager.
pub const ACK_TRACKED_TYPES: &[&str] =
    &["TICTACTOE_INVITE", "TICTACTOE_MOVE", "FILE_CHUNK", "FILE_OFFER", "DM"];
