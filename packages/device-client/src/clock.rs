//! Clock offset estimation against the device server clock
//!
//! A sync round probes the server time endpoint several times in sequence.
//! Each probe yields a round-trip delay and an offset estimate that assumes
//! the outbound and inbound legs took equally long. Low-delay probes are the
//! most trustworthy, so the round keeps the fastest 80% (when more than three
//! probes succeeded) and averages their offsets.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::DeviceResult;

/// Rounds with this many samples or fewer use every sample
const MIN_SAMPLES_FOR_TRIM: usize = 3;

/// Anything that can report the remote clock, in milliseconds
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn server_time(&self) -> DeviceResult<i64>;
}

/// Local wall clock in (fractional) milliseconds since the Unix epoch
pub trait LocalClock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_ms(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1000.0
    }
}

/// Result of a single clock probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Local time between sending the probe and receiving the answer (ms)
    pub round_trip_delay: f64,
    /// Remote minus local clock at receive time (ms)
    pub offset: f64,
}

impl Sample {
    /// Derive a sample from the local send/receive times and the remote timestamp
    pub fn from_probe(sent_at: f64, received_at: f64, remote_time: i64) -> Self {
        let round_trip_delay = (received_at - sent_at).max(0.0);
        let estimated_remote_at_receive = remote_time as f64 + round_trip_delay / 2.0;
        Self {
            round_trip_delay,
            offset: estimated_remote_at_receive - received_at,
        }
    }
}

/// Average the offsets of the lowest-delay samples
///
/// Returns `None` for an empty set. More than three samples are trimmed to
/// the fastest `ceil(n * 0.8)`.
pub fn aggregate(mut samples: Vec<Sample>) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    samples.sort_by(|a, b| a.round_trip_delay.total_cmp(&b.round_trip_delay));

    let keep = if samples.len() > MIN_SAMPLES_FOR_TRIM {
        // ceil(n * 4 / 5) without going through floating point
        (samples.len() * 4 + 4) / 5
    } else {
        samples.len()
    };

    let selected = &samples[..keep];
    let sum: f64 = selected.iter().map(|s| s.offset).sum();
    Some(sum / selected.len() as f64)
}

/// f64 stored in an atomic so readers never observe a torn value
#[derive(Debug, Default)]
struct OffsetCell(AtomicU64);

impl OffsetCell {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Owns the estimated offset between the local and the remote clock
///
/// Share it through an `Arc` with the playback dispatcher; every session
/// gets its own synchronizer.
#[derive(Debug)]
pub struct ClockSynchronizer<S, C = SystemClock> {
    source: S,
    clock: C,
    offset: OffsetCell,
    round: Mutex<()>,
}

impl<S: TimeSource> ClockSynchronizer<S> {
    /// Create a synchronizer using the system clock, with a zero offset
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock)
    }
}

impl<S: TimeSource, C: LocalClock> ClockSynchronizer<S, C> {
    /// Create a synchronizer with a custom local clock (for testing)
    pub fn with_clock(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            offset: OffsetCell::default(),
            round: Mutex::new(()),
        }
    }

    /// The time source probed by sync rounds
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Probe the remote clock once
    ///
    /// Returns `None` when the remote time could not be read; the failure is
    /// logged and the caller simply has one sample fewer.
    pub async fn probe_once(&self) -> Option<Sample> {
        let sent_at = self.clock.now_ms();
        let result = self.source.server_time().await;
        let received_at = self.clock.now_ms();

        match result {
            Ok(remote_time) => {
                let sample = Sample::from_probe(sent_at, received_at, remote_time);
                debug!(
                    round_trip_delay_ms = sample.round_trip_delay,
                    offset_ms = sample.offset,
                    "Clock probe completed"
                );
                Some(sample)
            }
            Err(e) => {
                warn!(error = %e, "Clock probe failed, skipping sample");
                None
            }
        }
    }

    /// Run one sync round of `sample_count` sequential probes
    ///
    /// Stores and returns the new offset. If every probe failed the previous
    /// offset is kept and returned.
    #[instrument(skip(self))]
    pub async fn sync_round(&self, sample_count: usize) -> f64 {
        let _round = self.round.lock().await;

        let mut samples = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            if let Some(sample) = self.probe_once().await {
                samples.push(sample);
            }
        }

        let successful = samples.len();
        match aggregate(samples) {
            Some(offset) => {
                self.offset.store(offset);
                info!(
                    offset_ms = offset,
                    successful,
                    requested = sample_count,
                    "Clock sync round completed"
                );
                offset
            }
            None => {
                let previous = self.offset.load();
                warn!(
                    requested = sample_count,
                    offset_ms = previous,
                    "Clock sync round had no successful probes, keeping previous offset"
                );
                previous
            }
        }
    }

    /// Estimated remote clock right now, in whole milliseconds
    pub fn estimate_remote_time(&self) -> i64 {
        (self.clock.now_ms() + self.offset.load()).round() as i64
    }

    /// Current offset (remote minus local) in milliseconds
    pub fn offset(&self) -> f64 {
        self.offset.load()
    }

    /// Override the offset with an externally supplied calibration
    pub fn set_offset(&self, offset: f64) {
        self.offset.store(offset);
    }
}
