//! I/O utilities for bidirectional relay.

mod relay;

pub use relay::{relay_bidirectional, Direction, RelayError, RelayStats};
