// In demos/client.rs
// Opens the server's channel, sends messages inbound and checks the echoes coming back.
use dmxp_duplex::SPSC::{default_channel_path, ChannelBuilder};
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const MESSAGE_TYPE_ID: i32 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [channel_path]", args[0]);
        std::process::exit(1);
    }

    let num_messages: usize = args[1].parse()?;
    let path = args.get(2).map(PathBuf::from).unwrap_or_else(default_channel_path);

    println!("Client: Opening channel at {}...", path.display());
    let channel = ChannelBuilder::new().with_path(&path).open()?;
    let inbound = channel.inbound();
    let outbound = channel.outbound();

    let mut sent_digest = Sha256::new();
    let mut received_digest = Sha256::new();
    let mut sent = 0;
    let mut received = 0;

    let start = Instant::now();
    let mut last_progress = start;
    while received < num_messages {
        if sent < num_messages {
            let message = format!("message_{}", sent);
            match inbound.write(MESSAGE_TYPE_ID, message.as_bytes()) {
                Ok(()) => {
                    sent_digest.update(message.as_bytes());
                    sent += 1;
                }
                Err(e) if e.is_retryable() => {}
                Err(e) => {
                    eprintln!("Failed to send message {}: {}", sent, e);
                    break;
                }
            }
        }

        let drained = outbound.read(
            |type_id, payload| {
                if type_id == MESSAGE_TYPE_ID {
                    received_digest.update(payload);
                }
                received += 1;
                if received % 100 == 0 {
                    println!("--- Received {} echoes ---", received);
                }
            },
            16,
        );

        if drained > 0 {
            last_progress = Instant::now();
        } else {
            if last_progress.elapsed() > Duration::from_secs(5) {
                eprintln!("Timeout waiting for echoes");
                break;
            }
            std::thread::yield_now();
        }
    }

    let elapsed = start.elapsed();
    println!("Client: Received {} echoes in {:.2?}", received, elapsed);
    println!(
        "Average: {:.2} round trips/second",
        received as f64 / elapsed.as_secs_f64()
    );

    if received == num_messages && sent_digest.finalize() == received_digest.finalize() {
        println!("All messages received successfully");
    }

    Ok(())
}
