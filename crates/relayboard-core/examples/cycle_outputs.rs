//! Relay board smoke test
//!
//! Switches every output on and off, then steps through the first eight
//! channels one at a time and prints the status word.
//!
//! Usage:
//!   cargo run --example cycle_outputs -- [PORT] [BAUD]
//!
//! Set `RUST_LOG=relayboard_core=debug` to see the frames on the wire.

use anyhow::Context;
use relayboard_core::prelude::*;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let port_name = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud_rate = match args.next() {
        Some(baud) => baud.parse().context("baud rate must be a number")?,
        None => 9600,
    };

    let settings = SerialSettings {
        baud_rate,
        ..SerialSettings::new(&port_name)
    };
    let link = SerialPortLink::connect(settings)
        .with_context(|| format!("failed to open {port_name}"))?;
    let client = RelayClient::new(link, ClientConfig::new(1, 8).with_baud_rate(baud_rate));

    client.on_all()?;
    thread::sleep(Duration::from_secs(1));
    client.off_all()?;
    thread::sleep(Duration::from_secs(1));

    for channel in 1..=client.config().branch_count() {
        client.on_one(channel)?;
        thread::sleep(Duration::from_millis(250));
    }
    println!("status: {:?}", client.status()?.active());

    client.on_point_nil(1, 500)?;
    println!("cached: {:?}", client.cached().active());
    thread::sleep(Duration::from_secs(1));
    println!("cached after pulse: {:?}", client.cached().active());

    client.off_all()?;
    Ok(())
}
