//! Error class constants for logging.
//!
//! These constants provide consistent error classification across all crates.

/// Malformed configuration or hop spec.
pub const ERROR_CONFIG: &str = "config";
/// Unreadable or undecodable private key.
pub const ERROR_CREDENTIAL: &str = "credential";
/// Network failure reaching a hop or the final destination.
pub const ERROR_DIAL: &str = "dial";
/// Secure-shell handshake or authentication failure.
pub const ERROR_HANDSHAKE: &str = "handshake";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Liveness probe failure.
pub const ERROR_PROBE: &str = "probe";
/// I/O error while pumping bytes.
pub const ERROR_COPY: &str = "copy";
/// I/O error.
pub const ERROR_IO: &str = "io";
