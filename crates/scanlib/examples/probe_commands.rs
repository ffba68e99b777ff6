//! Command discovery example.
//!
//! Sends every command of [`DEFAULT_PROBE_COMMANDS`] with a short pause in
//! between and prints a summary of what the scanner answered. Useful for
//! checking which commands a firmware version supports.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=info cargo run -p scanlib --example probe_commands
//! ```

use scanlib::uniden::models::ubc125xlt;
use scanlib::uniden::{SessionBuilder, DEFAULT_PROBE_COMMANDS, DEFAULT_PROBE_PAUSE};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut session = SessionBuilder::new(ubc125xlt()).build().await?;
    session.initialize().await?;

    let outcomes = session
        .probe_commands(DEFAULT_PROBE_COMMANDS, DEFAULT_PROBE_PAUSE)
        .await;

    println!("\n--- Summary of responses ---");
    for outcome in &outcomes {
        match &outcome.reply {
            Ok(text) => println!("{:<10} -> {}", outcome.command, text),
            Err(e) => println!("{:<10} -> error: {}", outcome.command, e),
        }
    }
    if outcomes.len() < DEFAULT_PROBE_COMMANDS.len() {
        println!(
            "stopped after {} of {} commands (session {})",
            outcomes.len(),
            DEFAULT_PROBE_COMMANDS.len(),
            session.state()
        );
    }

    session.close().await?;
    Ok(())
}
