pub mod normalize;
pub mod wav;

use crate::config::CANONICAL_SAMPLE_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn canonical_mono() -> Self {
        Self {
            sample_rate: CANONICAL_SAMPLE_RATE_HZ,
            channels: 1,
        }
    }
}

// A raw capture or decoded file before normalization: interleaved float
// samples plus the format metadata the capture path reported. Amplitudes
// are not yet guaranteed to be in [-1.0, 1.0].
#[derive(Clone, Debug, PartialEq)]
pub struct RawAudio {
    pub format: PcmFormat,
    pub samples: Vec<f32>,
}

// Mono waveform at a single sample rate, amplitudes in [-1.0, 1.0].
// Only the normalizer (and tests inside this crate) construct these.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub(crate) fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.sample_rate, self.samples.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("audio buffer is empty")]
    EmptyBuffer,

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("wav decode failed: {0}")]
    WavDecode(String),

    #[error("unsupported wav encoding: {0}")]
    UnsupportedWav(String),

    #[error("wav write failed: {0}")]
    WavWrite(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

pub fn duration_from_frames(sample_rate_hz: u32, frames: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_to_f32_basic() {
        let v = i16_to_f32_pcm(&[-32768, -1, 0, 1, 32767]);
        assert!((v[0] + 1.0).abs() < 1e-6);
        assert!((v[2] - 0.0).abs() < 1e-6);
        assert!(v[4] <= 1.0);
        assert!(v[4] > 0.9999);
    }

    #[test]
    fn i16_full_scale_range_stays_in_unit_interval() {
        let all: Vec<i16> = vec![i16::MIN, -12345, -1, 0, 1, 12345, i16::MAX];
        for s in i16_to_f32_pcm(&all) {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn duration_from_frames_canonical_second() {
        let d = duration_from_frames(22_050, 22_050);
        assert_eq!(d.as_secs(), 1);
    }

    #[test]
    fn duration_zero_rate_is_zero() {
        assert_eq!(duration_from_frames(0, 1000), Duration::from_secs(0));
    }
}
