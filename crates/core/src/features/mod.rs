mod mfcc;

use crate::audio::Waveform;
use crate::config::FeatureConfig;
use mfcc::MfccPlan;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("cannot extract features from an empty waveform")]
    InvalidInput,

    #[error("waveform rate {found} Hz does not match extractor rate {expected} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },
}

pub struct FeatureExtractor {
    config: FeatureConfig,
    plan: MfccPlan,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let plan = MfccPlan::new(&config);
        Self { config, plan }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    // Mean MFCC summary of a canonical waveform. Deterministic: the same
    // waveform under the same configuration always yields the same bytes.
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, FeatureError> {
        if waveform.is_empty() {
            return Err(FeatureError::InvalidInput);
        }
        if waveform.sample_rate() != self.config.sample_rate_hz {
            return Err(FeatureError::SampleRateMismatch {
                expected: self.config.sample_rate_hz,
                found: waveform.sample_rate(),
            });
        }
        Ok(FeatureVector::new(self.plan.mean_mfcc(waveform.samples())))
    }
}
