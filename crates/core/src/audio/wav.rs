use crate::audio::{AudioError, PcmFormat, RawAudio, Result, Waveform};
use std::path::Path;

// Decode a WAV file into interleaved float samples plus format metadata.
// Integer payloads are scaled to [-1.0, 1.0] here; everything else about
// the buffer (channel count, rate) is left for the normalizer.
pub fn decode(path: &Path) -> Result<RawAudio> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| AudioError::WavDecode(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(AudioError::UnsupportedWav(format!(
                    "{}-bit float",
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AudioError::WavDecode(e.to_string()))?
        }
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if !matches!(bits, 16 | 24 | 32) {
                return Err(AudioError::UnsupportedWav(format!("{bits}-bit int")));
            }
            let full_scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AudioError::WavDecode(e.to_string()))?
        }
    };

    Ok(RawAudio {
        format: PcmFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        },
        samples,
    })
}

// One-way export of a normalized waveform for playback and debugging.
// Never read back into the pipeline.
pub fn export_mono(waveform: &Waveform, path: &Path) -> Result<()> {
    if waveform.is_empty() {
        return Err(AudioError::EmptyBuffer);
    }
    if waveform.samples().iter().any(|s| !s.is_finite()) {
        return Err(AudioError::WavWrite(
            "samples contain NaN or infinity".to_owned(),
        ));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| AudioError::WavWrite(e.to_string()))?;
    for &sample in waveform.samples() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * f32::from(i16::MAX)) as i16)
            .map_err(|e| AudioError::WavWrite(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::WavWrite(e.to_string()))?;
    Ok(())
}
