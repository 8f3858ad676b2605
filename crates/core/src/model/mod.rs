mod forest;

pub use forest::{ForestParams, RandomForest};

use crate::config::FeatureConfig;
use crate::emotion::Emotion;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MODEL_SCHEMA_VERSION: u32 = 1;

// The persisted classifier: one JSON blob holding the fitted forest, the
// label table its class indices map through, and the exact feature
// configuration it was trained under. The engine compares that embedded
// configuration against its own at startup and refuses to serve on a
// mismatch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub pipeline: FeatureConfig,
    pub labels: Vec<Emotion>,
    pub forest: RandomForest,
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("model file unreadable: {0}")]
    Unreadable(String),

    #[error("model file is not a valid artifact: {0}")]
    Malformed(String),

    #[error("unsupported model schema version {found}, expected {expected}")]
    SchemaVersion { expected: u32, found: u32 },

    #[error("model write failed: {0}")]
    WriteFailed(String),
}

impl ModelArtifact {
    // Plain overwrite of any prior artifact at the path.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let file =
            std::fs::File::create(path).map_err(|e| ModelError::WriteFailed(e.to_string()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)
            .map_err(|e| ModelError::WriteFailed(e.to_string()))?;
        tracing::info!(path = %path.display(), "model artifact written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::Unreadable(e.to_string()))?;
        let artifact: ModelArtifact = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| ModelError::Malformed(e.to_string()))?;
        if artifact.schema_version != MODEL_SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion {
                expected: MODEL_SCHEMA_VERSION,
                found: artifact.schema_version,
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("speech-emotion-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn tiny_artifact() -> ModelArtifact {
        let x = vec![vec![0.0f32, 0.0], vec![1.0, 1.0]];
        let y = vec![0u32, 1];
        let forest = RandomForest::fit(
            &x,
            &y,
            2,
            ForestParams {
                tree_count: 3,
                ..ForestParams::default()
            },
        );
        ModelArtifact {
            schema_version: MODEL_SCHEMA_VERSION,
            pipeline: FeatureConfig::default(),
            labels: vec![Emotion::Happy, Emotion::Sad],
            forest,
        }
    }

    #[test]
    fn save_load_round_trip() {
        let path = temp_path("round-trip.json");
        let artifact = tiny_artifact();
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::Unreadable(_)));
    }

    #[test]
    fn garbage_file_is_malformed() {
        let path = temp_path("garbage.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wrong_schema_version_is_refused() {
        let path = temp_path("schema.json");
        let mut artifact = tiny_artifact();
        artifact.schema_version = 99;
        artifact.save(&path).unwrap();
        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ModelError::SchemaVersion {
                expected: MODEL_SCHEMA_VERSION,
                found: 99
            }
        ));
        std::fs::remove_file(&path).ok();
    }
}
