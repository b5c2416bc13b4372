//! Network-quality change detection
//!
//! The engine reports call statistics on a fixed period whether or not
//! anything moved. [`NetworkQualityMonitor`] deduplicates those samples into
//! change events so the UI only repaints when a field actually differs from
//! the last *reported* sample.

use crate::engine::IceState;
use crate::session::NetworkQuality;
use serde::{Deserialize, Serialize};

/// Last-reported connection-quality snapshot for the current call
///
/// A value object compared wholesale; replaced per new call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConnectionDetails {
    /// Coarse quality bucket
    pub quality: NetworkQuality,
    /// Negotiated codec name (e.g. "opus", "speex")
    pub codec: String,
    /// ICE state of the media path
    pub ice_state: IceState,
    /// Upload throughput in kbit/s
    pub upload_kbps: f32,
    /// Download throughput in kbit/s
    pub download_kbps: f32,
    /// Jitter in milliseconds
    pub jitter_ms: f32,
    /// Packet loss percentage
    pub packet_loss_percent: f32,
    /// Packets that arrived too late to play
    pub late_packets: u64,
    /// Round-trip delay in milliseconds
    pub round_trip_ms: u32,
    /// Whether the call these details belong to has ended
    pub ended: bool,
}

impl CallConnectionDetails {
    /// Empty snapshot used before the first sample of a call
    pub fn empty() -> Self {
        Self {
            quality: NetworkQuality::Unknown,
            codec: String::new(),
            ice_state: IceState::NotActivated,
            upload_kbps: 0.0,
            download_kbps: 0.0,
            jitter_ms: 0.0,
            packet_loss_percent: 0.0,
            late_packets: 0,
            round_trip_ms: 0,
            ended: false,
        }
    }
}

impl Default for CallConnectionDetails {
    fn default() -> Self {
        Self::empty()
    }
}

/// Deduplicates periodic statistics samples into change events
///
/// Pure change detector: [`observe`] returns whether any field differs from
/// the last reported sample. The `ended` flag is reported exactly once and
/// thereafter suppressed.
///
/// [`observe`]: NetworkQualityMonitor::observe
#[derive(Debug, Default)]
pub struct NetworkQualityMonitor {
    last_reported: Option<CallConnectionDetails>,
    ended_reported: bool,
}

impl NetworkQualityMonitor {
    /// Create a monitor with no reported samples
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a new sample; `true` means the sample should be reported
    pub fn observe(&mut self, sample: CallConnectionDetails) -> bool {
        if sample.ended && self.ended_reported {
            return false;
        }

        let changed = match &self.last_reported {
            Some(last) => *last != sample,
            None => true,
        };
        if !changed {
            return false;
        }

        if sample.ended {
            self.ended_reported = true;
        }
        self.last_reported = Some(sample);
        true
    }

    /// The last sample that was reported, if any
    pub fn last_reported(&self) -> Option<&CallConnectionDetails> {
        self.last_reported.as_ref()
    }

    /// Forget everything; called when a new call starts
    pub fn reset(&mut self) {
        self.last_reported = None;
        self.ended_reported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CallConnectionDetails {
        CallConnectionDetails {
            quality: NetworkQuality::Good,
            codec: "opus".into(),
            ice_state: IceState::Connected,
            upload_kbps: 24.0,
            download_kbps: 24.0,
            jitter_ms: 3.5,
            packet_loss_percent: 0.0,
            late_packets: 0,
            round_trip_ms: 80,
            ended: false,
        }
    }

    #[test]
    fn first_sample_is_a_change() {
        let mut m = NetworkQualityMonitor::new();
        assert!(m.observe(sample()));
    }

    #[test]
    fn identical_samples_are_suppressed() {
        let mut m = NetworkQualityMonitor::new();
        assert!(m.observe(sample()));
        assert!(!m.observe(sample()));

        let mut changed = sample();
        changed.round_trip_ms = 120;
        assert!(m.observe(changed));
    }

    #[test]
    fn ended_reported_exactly_once() {
        let mut m = NetworkQualityMonitor::new();
        assert!(m.observe(sample()));

        let mut ended = sample();
        ended.ended = true;
        assert!(m.observe(ended.clone()));
        assert!(!m.observe(ended.clone()));

        // Even a differing ended sample stays suppressed.
        ended.round_trip_ms = 999;
        assert!(!m.observe(ended));
    }

    #[test]
    fn reset_clears_suppression() {
        let mut m = NetworkQualityMonitor::new();
        let mut ended = sample();
        ended.ended = true;
        assert!(m.observe(ended.clone()));
        m.reset();
        assert!(m.observe(ended));
    }
}
