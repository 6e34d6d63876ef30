//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Hop Defaults
// ============================================================================

/// Port used for a hop whose address omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Default SSH keepalive interval in seconds (0 = disabled).
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 30;
/// Unanswered keepalives before the SSH library drops a session.
pub const DEFAULT_KEEPALIVE_MAX: usize = 3;

// ============================================================================
// Timeout Defaults
// ============================================================================

/// Default timeout for the TCP dial to the first hop, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default relay idle timeout in seconds (0 = disabled).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 0;

// ============================================================================
// Buffer/Size Defaults
// ============================================================================

/// Default relay buffer size per direction (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;

// ============================================================================
// Chain Refresh Defaults
// ============================================================================

/// Forwarding sessions between two scheduled chain rebuilds (0 = disabled).
pub const DEFAULT_RECONNECT_EVERY: u64 = 1000;

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default log level when neither config nor CLI set one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
