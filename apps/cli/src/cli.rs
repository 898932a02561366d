//! Command-line arguments

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "handysync", version, about = "Clock-synchronized HSSP playback control")]
pub struct Cli {
    /// Device API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a clock sync round and print the offset
    Sync {
        /// Probes per round (defaults to HANDY_SYNC_SAMPLES)
        #[arg(long)]
        samples: Option<usize>,
    },

    /// Print the estimated device time after a sync round
    Time,

    /// Register a script URL with the device
    Setup { url: String },

    /// Start playback at a video position
    Play {
        /// Video position in seconds
        #[arg(allow_negative_numbers = true)]
        seconds: f64,

        #[arg(long, default_value_t = 1.0)]
        rate: f64,

        #[arg(long = "loop")]
        looping: bool,
    },

    /// Stop playback
    Stop,

    /// Resync the device to a video position
    Resync {
        /// Video position in seconds
        #[arg(allow_negative_numbers = true)]
        seconds: f64,

        /// Smoothing filter (defaults to HANDY_SYNC_FILTER)
        #[arg(long)]
        filter: Option<f64>,
    },

    /// Print the playback state
    State,

    /// Read or update the stroke limits
    Stroke {
        #[arg(long)]
        min: Option<f64>,

        #[arg(long)]
        max: Option<f64>,
    },

    /// Print device information
    Info,

    /// Read or set the device mode
    Mode { value: Option<u8> },

    /// Check whether the device is online
    Connected,

    /// Read or set the device-side HSTP offset in milliseconds
    HstpOffset {
        #[arg(allow_negative_numbers = true)]
        value: Option<i64>,
    },

    /// Print device events as they arrive
    Events {
        /// Stop after this many events
        #[arg(long)]
        count: Option<usize>,
    },
}
