//! Basic scanner session example.
//!
//! Opens a Uniden UBC125XLT, prints its model, firmware version and volume,
//! then reads the frequency stored in memory channel 1.
//!
//! # Requirements
//!
//! - A UBC125XLT connected via USB
//! - Permission to open the device (udev rule on Linux)
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=scanlib=debug cargo run -p scanlib --example basic_scanner
//! ```

use scanlib::text_io::reply::parse_frequency_mhz;
use scanlib::uniden::commands::{self, reply_payload};
use scanlib::uniden::models::ubc125xlt;
use scanlib::uniden::SessionBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let model = ubc125xlt();
    println!("Connecting to {}...", model.name);

    let mut session = SessionBuilder::new(model).build().await?;
    let drained = session.initialize().await?;
    println!("Ready (discarded {} stale bytes)", drained.bytes);

    let reply = session.get_model().await?;
    match commands::parse_model_response(reply.text()) {
        Some(name) => println!("Model: {name}"),
        None => println!("Unexpected model reply: {reply}"),
    }

    println!("Firmware: {}", session.get_firmware_version().await?);

    let reply = session.get_volume().await?;
    match commands::parse_level_response(reply.text(), commands::CMD_VOLUME) {
        Some(level) => println!("Volume: {level}"),
        None => println!("Volume reply: {reply}"),
    }

    let channel = 1;
    let reply = session.get_channel_frequency(channel).await?;
    let mhz = reply_payload(reply.text(), commands::CMD_CHANNEL_FREQUENCY)
        .and_then(parse_frequency_mhz);
    match mhz {
        Some(mhz) => println!("Channel {channel}: {mhz:.4} MHz"),
        None => println!("Channel {channel}: {reply}"),
    }

    session.close().await?;
    println!("Done.");
    Ok(())
}
