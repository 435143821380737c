//! One-shot throughput probe and signed-URL lifetime sizing.

use crate::transfer::progress::format_bit_rate;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shortest signed-URL lifetime requested, even for tiny files.
pub const MIN_WINDOW_MINUTES: u32 = 2;

/// Longest signed-URL lifetime the remote service grants.
pub const MAX_WINDOW_MINUTES: u32 = 60;

/// Measured transfer speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    bits_per_second: f64,
}

impl Throughput {
    /// `None` when nothing was transferred or no time elapsed.
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Option<Self> {
        let seconds = elapsed.as_secs_f64();
        if bytes == 0 || seconds <= 0.0 {
            return None;
        }
        Some(Self {
            bits_per_second: bytes as f64 * 8.0 / seconds,
        })
    }

    pub fn from_bits_per_second(bits_per_second: f64) -> Option<Self> {
        (bits_per_second.is_finite() && bits_per_second > 0.0).then_some(Self { bits_per_second })
    }

    pub fn bits_per_second(&self) -> f64 {
        self.bits_per_second
    }
}

/// Signed-URL lifetime for a file of `size_bytes`.
///
/// `ceil(bits / bps / 60)` clamped to `[MIN_WINDOW_MINUTES, MAX_WINDOW_MINUTES]`.
/// Without a measurement the ceiling is used.
pub fn transfer_window_minutes(size_bytes: u64, throughput: Option<Throughput>) -> u32 {
    let Some(throughput) = throughput else {
        return MAX_WINDOW_MINUTES;
    };

    let minutes = (size_bytes as f64 * 8.0 / throughput.bits_per_second / 60.0).ceil();
    minutes.clamp(MIN_WINDOW_MINUTES as f64, MAX_WINDOW_MINUTES as f64) as u32
}

/// Downloads a fixed reference payload and times it.
pub struct BandwidthEstimator {
    client: reqwest::Client,
    probe_url: Option<String>,
    timeout: Duration,
}

impl BandwidthEstimator {
    pub fn new(client: reqwest::Client, probe_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            probe_url,
            timeout,
        }
    }

    /// Run the probe. Any failure is logged and yields no measurement.
    pub async fn measure(&self) -> Option<Throughput> {
        let Some(url) = self.probe_url.as_deref() else {
            info!("No speed probe configured, using {} minute transfer windows", MAX_WINDOW_MINUTES);
            return None;
        };

        let start = Instant::now();
        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("Speed probe returned status {}", resp.status());
                return None;
            }
            Err(e) => {
                warn!("Speed probe failed: {}", e);
                return None;
            }
        };

        let payload = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Speed probe body failed: {}", e);
                return None;
            }
        };

        let throughput = Throughput::from_transfer(payload.len() as u64, start.elapsed());
        match throughput {
            Some(t) => info!(
                "Measured throughput: {} ({} bytes in {:?})",
                format_bit_rate(t.bits_per_second()),
                payload.len(),
                start.elapsed()
            ),
            None => warn!("Speed probe transferred nothing"),
        }
        throughput
    }
}
