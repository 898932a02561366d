//! Subcommand execution
//!
//! Every command prints one JSON document to stdout (events print one per
//! line). A command whose device call degraded to `false` / `None` exits
//! with an error after printing.

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use handysync_device_client::{DeviceClient, PlayOptions, PlaybackDispatcher};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::Command;
use crate::config::Config;

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an optional result, failing the command on `None`
fn print_outcome<T: serde::Serialize>(operation: &str, outcome: Option<T>) -> Result<()> {
    match outcome {
        Some(value) => print_json(&serde_json::to_value(value)?),
        None => {
            print_json(&Value::Null)?;
            bail!("{operation} failed");
        }
    }
}

fn print_flag(operation: &str, key: &str, flag: bool) -> Result<()> {
    print_json(&json!({ key: flag }))?;
    if !flag {
        bail!("{operation} failed");
    }
    Ok(())
}

pub async fn run(config: &Config, command: Command) -> Result<()> {
    let client = DeviceClient::new(&config.device).context("Failed to create device client")?;
    let dispatcher = PlaybackDispatcher::new(client);

    match command {
        Command::Sync { samples } => {
            let samples = samples.unwrap_or(config.device.sync_samples).max(1);
            let offset = dispatcher.synchronizer().sync_round(samples).await;
            print_json(&json!({ "offset_ms": offset, "samples": samples }))
        }

        Command::Time => {
            let offset = dispatcher.sync_clock().await;
            let server_time = dispatcher.synchronizer().estimate_remote_time();
            print_json(&json!({ "offset_ms": offset, "server_time": server_time }))
        }

        Command::Setup { url } => {
            let ok = dispatcher.setup(&url).await;
            print_flag("setup", "ready", ok)
        }

        Command::Play {
            seconds,
            rate,
            looping,
        } => {
            let offset = dispatcher.sync_clock().await;
            info!(offset_ms = offset, "Clock synchronized");
            let options = PlayOptions {
                playback_rate: rate,
                looping,
            };
            print_outcome("play", dispatcher.play(seconds, options).await)
        }

        Command::Stop => print_outcome("stop", dispatcher.stop().await),

        Command::Resync { seconds, filter } => {
            let offset = dispatcher.sync_clock().await;
            info!(offset_ms = offset, "Clock synchronized");
            let filter = filter.unwrap_or(config.device.sync_filter);
            let ok = dispatcher.sync_video_time(seconds, filter).await;
            print_flag("resync", "synced", ok)
        }

        Command::State => print_outcome("state", dispatcher.playback_state().await),

        Command::Stroke { min, max } => {
            if min.is_none() && max.is_none() {
                return print_outcome("stroke", dispatcher.stroke_settings().await);
            }

            // Fill the missing bound from the device
            let (min, max) = match (min, max) {
                (Some(min), Some(max)) => (min, max),
                (min, max) => {
                    let current = dispatcher
                        .stroke_settings()
                        .await
                        .context("Failed to read current stroke settings")?;
                    (min.unwrap_or(current.min), max.unwrap_or(current.max))
                }
            };
            print_outcome("stroke", dispatcher.set_stroke_settings(min, max).await)
        }

        Command::Info => print_outcome("info", dispatcher.device_info().await),

        Command::Mode { value } => match value {
            Some(mode) => print_outcome("mode", dispatcher.set_mode(mode).await),
            None => print_outcome("mode", dispatcher.mode().await),
        },

        Command::Connected => {
            let connected = dispatcher.is_connected().await;
            print_json(&json!({ "connected": connected }))
        }

        Command::HstpOffset { value } => match value {
            Some(offset) => print_outcome("hstp-offset", dispatcher.set_hstp_offset(offset).await),
            None => print_outcome("hstp-offset", dispatcher.hstp_offset().await),
        },

        Command::Events { count } => stream_events(dispatcher.client(), count).await,
    }
}

async fn stream_events(client: &DeviceClient, count: Option<usize>) -> Result<()> {
    let mut events = client
        .subscribe_events()
        .await
        .context("Failed to subscribe to device events")?;

    let mut received = 0usize;
    while count.map_or(true, |limit| received < limit) {
        let Some(event) = events.next().await else {
            break;
        };
        let event = event.context("Event stream failed")?;
        let data = event.json().unwrap_or_else(|| Value::String(event.data.clone()));
        println!(
            "{}",
            json!({ "event": event.event, "data": data, "id": event.id })
        );
        received += 1;
    }

    info!(received, "Event stream closed");
    Ok(())
}
