use crate::audio::{AudioError, RawAudio, Result, Waveform};
use rubato::{FftFixedIn, Resampler};

const RESAMPLE_CHUNK: usize = 1024;

// Scale applied when a float buffer still carries integer full-scale values
// (some capture paths hand over 16-bit PCM reinterpreted as f32).
const I16_FULL_SCALE: f32 = 32768.0;

pub struct Normalizer {
    target_rate: u32,
}

impl Normalizer {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    // Collapse to mono, fix amplitude scaling, resample to the target rate.
    // Resampler failure falls back to treating the buffer as already at the
    // target rate; that keeps a capture analyzable at the cost of feature
    // accuracy, so it is always logged.
    pub fn normalize(&self, raw: RawAudio) -> Result<Waveform> {
        if raw.samples.is_empty() {
            return Err(AudioError::EmptyBuffer);
        }

        let mono = downmix_mean(&raw.samples, raw.format.channels);
        let scaled = rescale_if_integer_range(mono);

        let source_rate = raw.format.sample_rate;
        let mut samples = if source_rate == self.target_rate {
            scaled
        } else {
            match resample(&scaled, source_rate, self.target_rate) {
                Ok(resampled) => resampled,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        source_rate,
                        target_rate = self.target_rate,
                        "resample failed, treating capture as already at target rate"
                    );
                    scaled
                }
            }
        };

        for s in samples.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        Ok(Waveform::new(samples, self.target_rate))
    }
}

fn downmix_mean(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() / channels as f32);
    }
    mono
}

fn rescale_if_integer_range(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |a, &s| a.max(s.abs()));
    if peak > 1.0 {
        for s in samples.iter_mut() {
            *s /= I16_FULL_SCALE;
        }
    }
    samples
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "degenerate sample rate {from_rate} -> {to_rate}"
        )));
    }
    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        1, // sub-chunks
        1, // channels
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected =
        ((samples.len() as u64 * u64::from(to_rate)) / u64::from(from_rate)) as usize;
    let mut out: Vec<f32> = Vec::with_capacity(expected + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let take = resampler.input_frames_next();
        let frames = resampler
            .process(&[&samples[pos..pos + take]], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if let Some(channel) = frames.into_iter().next() {
            out.extend(channel);
        }
        pos += take;
    }

    if pos < samples.len() {
        let frames = resampler
            .process_partial(Some(&[&samples[pos..]]), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if let Some(channel) = frames.into_iter().next() {
            out.extend(channel);
        }
    }

    // Flush the resampler's internal latency so the tail is not lost.
    let frames = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;
    if let Some(channel) = frames.into_iter().next() {
        out.extend(channel);
    }

    if out.len() > delay {
        out.drain(..delay);
    }
    out.truncate(expected);
    Ok(out)
}
