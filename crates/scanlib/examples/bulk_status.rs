//! Bulk status polling example.
//!
//! Reads the `GLG` bulk status once a second and prints frequency, mode and
//! channel. Exchange events are printed as they happen through a
//! [`BroadcastObserver`].
//!
//! # Usage
//!
//! ```sh
//! cargo run -p scanlib --example bulk_status
//! ```

use std::sync::Arc;
use std::time::Duration;

use scanlib::uniden::models::ubc125xlt;
use scanlib::uniden::SessionBuilder;
use scanlib::{BroadcastObserver, ScannerEvent};
use tracing_subscriber::EnvFilter;

const POLLS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let observer = Arc::new(BroadcastObserver::new(64));
    let mut events = observer.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ScannerEvent::ContinuationRead { command, timed_out } => {
                    println!("  [{command}] continuation read (timed out: {timed_out})");
                }
                ScannerEvent::CommandFailed { command, error } => {
                    println!("  [{command}] failed: {error}");
                }
                _ => {}
            }
        }
    });

    let mut session = SessionBuilder::new(ubc125xlt())
        .observer(observer)
        .build()
        .await?;
    session.initialize().await?;

    for _ in 0..POLLS {
        match session.read_status().await {
            Ok(Some(status)) if status.is_idle() => println!("idle"),
            Ok(Some(status)) => println!(
                "{:>10} MHz  {:<4} ch {}{}",
                status
                    .frequency_mhz
                    .map(|f| format!("{f:.4}"))
                    .unwrap_or_else(|| "?".into()),
                status.mode.as_deref().unwrap_or("-"),
                status.channel.as_deref().unwrap_or("-"),
                if status.partial { " (partial)" } else { "" },
            ),
            Ok(None) => println!("unexpected reply"),
            Err(e) if e.is_device_lost() => {
                println!("scanner disconnected: {e}");
                break;
            }
            Err(e) => println!("error: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    session.close().await?;
    Ok(())
}
