use crate::config::FeatureConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

// Floor applied before the log so silent frames stay finite (-100 dB).
const LOG_FLOOR: f32 = 1e-10;

// Precomputed window, mel filterbank and DCT basis for one configuration.
// Building the plan once keeps repeated extraction cheap and guarantees the
// exact same coefficients for every waveform processed under it.
pub(crate) struct MfccPlan {
    fft_size: usize,
    hop_length: usize,
    mfcc_count: usize,
    mel_bands: usize,
    window: Vec<f32>,
    // mel_bands rows of (fft_size / 2 + 1) weights
    mel_bank: Vec<Vec<f32>>,
    // mfcc_count rows of mel_bands orthonormal DCT-II factors
    dct_basis: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl MfccPlan {
    pub fn new(config: &FeatureConfig) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.fft_size);
        Self {
            fft_size: config.fft_size,
            hop_length: config.hop_length,
            mfcc_count: config.mfcc_count,
            mel_bands: config.mel_bands,
            window: hann_window(config.fft_size),
            mel_bank: mel_filterbank(config.mel_bands, config.fft_size, config.sample_rate_hz),
            dct_basis: dct_ii_basis(config.mfcc_count, config.mel_bands),
            fft,
        }
    }

    // Mean MFCC vector across all analysis frames. The caller guarantees a
    // non-empty input; inputs shorter than one window are zero-padded to a
    // single full frame.
    pub fn mean_mfcc(&self, samples: &[f32]) -> Vec<f32> {
        let padded;
        let samples = if samples.len() < self.fft_size {
            tracing::debug!(
                samples = samples.len(),
                window = self.fft_size,
                "waveform shorter than one analysis window, zero-padding"
            );
            let mut buf = samples.to_vec();
            buf.resize(self.fft_size, 0.0);
            padded = buf;
            &padded
        } else {
            samples
        };

        let frame_count = 1 + (samples.len() - self.fft_size) / self.hop_length;
        let mut mean = vec![0.0f32; self.mfcc_count];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); self.fft_size];
        let mut power = vec![0.0f32; self.fft_size / 2 + 1];
        let mut log_mel = vec![0.0f32; self.mel_bands];

        for frame_idx in 0..frame_count {
            let start = frame_idx * self.hop_length;
            let frame = &samples[start..start + self.fft_size];

            for (i, (s, w)) in frame.iter().zip(self.window.iter()).enumerate() {
                spectrum[i] = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut spectrum);

            for (k, p) in power.iter_mut().enumerate() {
                *p = spectrum[k].norm_sqr();
            }

            for (m, row) in self.mel_bank.iter().enumerate() {
                let energy: f32 = row.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                log_mel[m] = 10.0 * energy.max(LOG_FLOOR).log10();
            }

            for (c, basis) in self.dct_basis.iter().enumerate() {
                let coeff: f32 = basis.iter().zip(log_mel.iter()).map(|(b, e)| b * e).sum();
                mean[c] += coeff;
            }
        }

        for c in mean.iter_mut() {
            *c /= frame_count as f32;
        }
        mean
    }
}

// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / size as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

// Triangular mel filterbank over the spectrum bins, bands equally spaced on
// the mel scale between 0 Hz and the Nyquist frequency.
fn mel_filterbank(mel_bands: usize, fft_size: usize, sample_rate_hz: u32) -> Vec<Vec<f32>> {
    let bins = fft_size / 2 + 1;
    let nyquist = sample_rate_hz as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);

    let band_edges: Vec<f32> = (0..mel_bands + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (mel_bands + 1) as f32))
        .collect();

    let bin_hz = |k: usize| k as f32 * sample_rate_hz as f32 / fft_size as f32;

    let mut bank = Vec::with_capacity(mel_bands);
    for m in 0..mel_bands {
        let (lo, center, hi) = (band_edges[m], band_edges[m + 1], band_edges[m + 2]);
        let mut row = vec![0.0f32; bins];
        for (k, w) in row.iter_mut().enumerate() {
            let f = bin_hz(k);
            if f > lo && f < hi {
                let rising = (f - lo) / (center - lo);
                let falling = (hi - f) / (hi - center);
                *w = rising.min(falling).max(0.0);
            }
        }
        bank.push(row);
    }
    bank
}

// Orthonormal DCT-II over the log-mel energies.
fn dct_ii_basis(mfcc_count: usize, mel_bands: usize) -> Vec<Vec<f32>> {
    let n = mel_bands as f32;
    (0..mfcc_count)
        .map(|c| {
            let scale = if c == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..mel_bands)
                .map(|m| {
                    scale
                        * (std::f32::consts::PI / n * (m as f32 + 0.5) * c as f32).cos()
                })
                .collect()
        })
        .collect()
}
