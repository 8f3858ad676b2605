use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CANONICAL_SAMPLE_RATE_HZ: u32 = 22_050;
pub const DEFAULT_MFCC_COUNT: usize = 40;
pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_HOP_LENGTH: usize = 512;
pub const DEFAULT_MEL_BANDS: usize = 128;
pub const DEFAULT_HOLDOUT_FRACTION: f32 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_TREE_COUNT: usize = 100;
pub const DEFAULT_FOREST_SEED: u64 = 42;
pub const DEFAULT_MODEL_PATH: &str = "emotion_model.json";
pub const ENV_MODEL_PATH: &str = "SPEECH_EMOTION_MODEL";

// The single feature-pipeline configuration shared by training and serving.
// A persisted model records the value it was trained under, and the engine
// refuses to start when its own value differs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureConfig {
    pub sample_rate_hz: u32,
    pub mfcc_count: usize,
    pub fft_size: usize,
    pub hop_length: usize,
    pub mel_bands: usize,
}

impl FeatureConfig {
    pub fn new(
        sample_rate_hz: u32,
        mfcc_count: usize,
        fft_size: usize,
        hop_length: usize,
        mel_bands: usize,
    ) -> Result<Self, ConfigError> {
        if sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if mfcc_count == 0 || fft_size == 0 || hop_length == 0 || mel_bands == 0 {
            return Err(ConfigError::ZeroFeatureParam);
        }
        if mfcc_count > mel_bands {
            return Err(ConfigError::CoefficientsExceedMelBands {
                mfcc_count,
                mel_bands,
            });
        }
        if hop_length > fft_size {
            return Err(ConfigError::HopExceedsWindow {
                hop_length,
                fft_size,
            });
        }
        Ok(Self {
            sample_rate_hz,
            mfcc_count,
            fft_size,
            hop_length,
            mel_bands,
        })
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: CANONICAL_SAMPLE_RATE_HZ,
            mfcc_count: DEFAULT_MFCC_COUNT,
            fft_size: DEFAULT_FFT_SIZE,
            hop_length: DEFAULT_HOP_LENGTH,
            mel_bands: DEFAULT_MEL_BANDS,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HoldoutFraction(f32);

impl HoldoutFraction {
    pub fn new(value: f32) -> Result<Self, ConfigError> {
        if !(value > 0.0 && value < 1.0) {
            return Err(ConfigError::HoldoutOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Default for HoldoutFraction {
    fn default() -> Self {
        Self(DEFAULT_HOLDOUT_FRACTION)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainConfig {
    pub holdout: HoldoutFraction,
    pub split_seed: u64,
    pub tree_count: usize,
    pub forest_seed: u64,
}

impl TrainConfig {
    pub fn new(
        holdout: HoldoutFraction,
        split_seed: u64,
        tree_count: usize,
        forest_seed: u64,
    ) -> Result<Self, ConfigError> {
        if tree_count == 0 {
            return Err(ConfigError::ZeroTrees);
        }
        Ok(Self {
            holdout,
            split_seed,
            tree_count,
            forest_seed,
        })
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            holdout: HoldoutFraction::default(),
            split_seed: DEFAULT_SPLIT_SEED,
            tree_count: DEFAULT_TREE_COUNT,
            forest_seed: DEFAULT_FOREST_SEED,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,
    #[error("feature parameters must all be > 0")]
    ZeroFeatureParam,
    #[error("coefficient count {mfcc_count} exceeds mel band count {mel_bands}")]
    CoefficientsExceedMelBands { mfcc_count: usize, mel_bands: usize },
    #[error("hop length {hop_length} exceeds analysis window {fft_size}")]
    HopExceedsWindow { hop_length: usize, fft_size: usize },
    #[error("holdout fraction must be in (0, 1), got {0}")]
    HoldoutOutOfRange(f32),
    #[error("tree count must be > 0")]
    ZeroTrees,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_model_path(cli_value: Option<String>, env: &impl Env) -> PathBuf {
    PathBuf::from(resolve_string_with_default(
        cli_value,
        ENV_MODEL_PATH,
        env,
        DEFAULT_MODEL_PATH,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_config_default_is_valid() {
        let cfg = FeatureConfig::default();
        let rebuilt = FeatureConfig::new(
            cfg.sample_rate_hz,
            cfg.mfcc_count,
            cfg.fft_size,
            cfg.hop_length,
            cfg.mel_bands,
        )
        .expect("default config valid");
        assert_eq!(cfg, rebuilt);
        assert_eq!(cfg.sample_rate_hz, 22_050);
        assert_eq!(cfg.mfcc_count, 40);
    }

    #[test]
    fn feature_config_rejects_more_coefficients_than_bands() {
        let err = FeatureConfig::new(22_050, 64, 2048, 512, 40).unwrap_err();
        assert_eq!(
            err,
            ConfigError::CoefficientsExceedMelBands {
                mfcc_count: 64,
                mel_bands: 40
            }
        );
    }

    #[test]
    fn holdout_fraction_bounds() {
        assert!(HoldoutFraction::new(0.2).is_ok());
        assert!(HoldoutFraction::new(0.0).is_err());
        assert!(HoldoutFraction::new(1.0).is_err());
        assert!(HoldoutFraction::new(f32::NAN).is_err());
    }

    #[test]
    fn model_path_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let path = resolve_model_path(Some("/cli/model.json".to_owned()), &env);
        assert_eq!(path, PathBuf::from("/cli/model.json"));
    }

    #[test]
    fn model_path_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let path = resolve_model_path(None, &env);
        assert_eq!(path, PathBuf::from("/env/model.json"));
    }

    #[test]
    fn model_path_default_used_when_both_missing() {
        let path = resolve_model_path(None, &MapEnv::default());
        assert_eq!(path, PathBuf::from(DEFAULT_MODEL_PATH));
    }
}
