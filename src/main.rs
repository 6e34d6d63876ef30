//! hopchain command-line entry point.
//!
//! Listens on a local address and forwards every accepted connection to a
//! remote address through a chain of SSH hops:
//!
//! ```text
//! hopchain --sshhost ops@bastion,deploy@10.0.0.5 --sshkey ~/.ssh/id_ed25519 \
//!          --localaddr 127.0.0.1:5432 --remoteaddr db.internal:5432
//! ```

use std::process::ExitCode;

use clap::Parser;
use hopchain_tunnel::TunnelArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = TunnelArgs::parse();

    match hopchain_tunnel::cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
