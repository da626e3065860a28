// In demos/server.rs
// Creates the channel and echoes every inbound message onto the outbound buffer.
use dmxp_duplex::SPSC::{default_channel_path, ChannelBuilder, Forwarder};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_channel_path);

    let channel = ChannelBuilder::new().with_path(&path).create()?;
    println!("Server: Created channel at {}", path.display());

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);

    // Handle Ctrl+C to stop the loop and clean up
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })?;

    println!("Server: Echoing messages, press Ctrl+C to exit...");
    let mut forwarder = Forwarder::new(channel.inbound(), channel.outbound());
    let result = forwarder.run(&running);

    channel.unlink()?;

    let stats = result?;
    println!(
        "Server: Forwarded {} messages in {} cycles",
        stats.forwarded, stats.cycles
    );
    Ok(())
}
