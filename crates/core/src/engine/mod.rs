use crate::config::FeatureConfig;
use crate::emotion::Emotion;
use crate::features::FeatureVector;
use crate::model::{ModelArtifact, ModelError};
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: Emotion,
    pub confidence: f32,
    pub distribution: Vec<(Emotion, f32)>,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    // Fatal at session start: the session never serves predictions without
    // a loadable model.
    #[error("cannot start inference session: {0}")]
    Startup(#[from] ModelError),

    #[error(
        "model was trained under a different feature configuration \
         (model: {model:?}, session: {session:?})"
    )]
    ConfigMismatch {
        model: FeatureConfig,
        session: FeatureConfig,
    },

    // Recoverable per request; carries the offending shape for diagnosis.
    #[error("feature vector length {found} does not match model input {expected}")]
    Prediction { expected: usize, found: usize },
}

// Loaded once per serving session and held read-only afterwards.
#[derive(Debug)]
pub struct EmotionEngine {
    artifact: ModelArtifact,
}

impl EmotionEngine {
    pub fn load(path: &Path, session_config: &FeatureConfig) -> Result<Self, EngineError> {
        let artifact = ModelArtifact::load(path)?;
        tracing::info!(
            path = %path.display(),
            labels = artifact.labels.len(),
            "model artifact loaded"
        );
        Self::from_artifact(artifact, session_config)
    }

    pub fn from_artifact(
        artifact: ModelArtifact,
        session_config: &FeatureConfig,
    ) -> Result<Self, EngineError> {
        if artifact.pipeline != *session_config {
            return Err(EngineError::ConfigMismatch {
                model: artifact.pipeline,
                session: *session_config,
            });
        }
        if artifact.labels.is_empty() || artifact.labels.len() != artifact.forest.class_count() {
            return Err(EngineError::Startup(ModelError::Malformed(
                "label table does not match classifier class count".to_owned(),
            )));
        }
        Ok(Self { artifact })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.artifact.pipeline
    }

    pub fn labels(&self) -> &[Emotion] {
        &self.artifact.labels
    }

    pub fn classify(&self, features: &FeatureVector) -> Result<Prediction, EngineError> {
        let expected = self.artifact.forest.feature_count();
        if features.len() != expected {
            return Err(EngineError::Prediction {
                expected,
                found: features.len(),
            });
        }

        let proba = self.artifact.forest.predict_proba(features.values());
        let distribution: Vec<(Emotion, f32)> = self
            .artifact
            .labels
            .iter()
            .copied()
            .zip(proba.iter().copied())
            .collect();

        let (label, confidence) = distribution
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((Emotion::Unknown, 0.0));

        Ok(Prediction {
            label,
            confidence,
            distribution,
        })
    }
}
