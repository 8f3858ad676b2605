use crate::audio::normalize::Normalizer;
use crate::audio::{wav, AudioError};
use crate::capture::{CaptureFeed, CaptureSource};
use crate::config::{FeatureConfig, TrainConfig};
use crate::corpus::{CorpusError, CorpusLoader, LabeledExample};
use crate::emotion::Emotion;
use crate::engine::{EmotionEngine, EngineError, Prediction};
use crate::features::{FeatureError, FeatureExtractor};
use crate::model::{ForestParams, ModelArtifact, ModelError, RandomForest, MODEL_SCHEMA_VERSION};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no audio captured yet, record something before analyzing")]
    CaptureEmpty,

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainReport {
    pub example_count: usize,
    pub train_count: usize,
    pub holdout_count: usize,
    pub label_count: usize,
    // None when the corpus was too small to hold anything out.
    pub holdout_accuracy: Option<f32>,
    pub model_path: PathBuf,
}

// The whole training entry point: corpus -> split -> fit -> evaluate ->
// persist. Held-out accuracy is a diagnostic, not a gate; the artifact is
// written regardless and overwrites any prior model at the path.
pub fn train_and_persist(
    corpus_root: &Path,
    model_path: &Path,
    feature: FeatureConfig,
    train: TrainConfig,
) -> Result<TrainReport, PipelineError> {
    let loader = CorpusLoader::new(feature);
    let dataset = loader.load(corpus_root)?;
    let example_count = dataset.len();

    let (train_set, holdout_set) = dataset.split(train.holdout, train.split_seed);
    tracing::info!(
        train = train_set.len(),
        holdout = holdout_set.len(),
        "dataset partitioned"
    );

    let labels = observed_labels(&train_set);
    let (x, y) = to_rows(&train_set, &labels);
    let forest = RandomForest::fit(
        &x,
        &y,
        labels.len(),
        ForestParams {
            tree_count: train.tree_count,
            seed: train.forest_seed,
            ..ForestParams::default()
        },
    );

    let holdout_accuracy = evaluate(&forest, &labels, &holdout_set);
    match holdout_accuracy {
        Some(acc) => tracing::info!(accuracy = acc, "held-out evaluation complete"),
        None => tracing::warn!("holdout set empty, skipping evaluation"),
    }

    let artifact = ModelArtifact {
        schema_version: MODEL_SCHEMA_VERSION,
        pipeline: feature,
        labels: labels.clone(),
        forest,
    };
    artifact.save(model_path)?;

    Ok(TrainReport {
        example_count,
        train_count: train_set.len(),
        holdout_count: holdout_set.len(),
        label_count: labels.len(),
        holdout_accuracy,
        model_path: model_path.to_path_buf(),
    })
}

// Labels actually present in the training subset, in the canonical table
// order so class indices are stable across runs.
fn observed_labels(examples: &[LabeledExample]) -> Vec<Emotion> {
    Emotion::ALL
        .into_iter()
        .filter(|label| examples.iter().any(|e| e.label == *label))
        .collect()
}

fn to_rows(examples: &[LabeledExample], labels: &[Emotion]) -> (Vec<Vec<f32>>, Vec<u32>) {
    let mut x = Vec::with_capacity(examples.len());
    let mut y = Vec::with_capacity(examples.len());
    for example in examples {
        // observed_labels came from this same set, the lookup cannot miss
        if let Some(class) = labels.iter().position(|l| *l == example.label) {
            x.push(example.features.values().to_vec());
            y.push(class as u32);
        }
    }
    (x, y)
}

fn evaluate(forest: &RandomForest, labels: &[Emotion], holdout: &[LabeledExample]) -> Option<f32> {
    if holdout.is_empty() {
        return None;
    }
    let correct = holdout
        .iter()
        .filter(|example| {
            let class = forest.predict(example.features.values()) as usize;
            labels.get(class) == Some(&example.label)
        })
        .count();
    Some(correct as f32 / holdout.len() as f32)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub prediction: Prediction,
    pub waveform_duration: Duration,
    pub exported_wav: Option<PathBuf>,
}

// One serving session: model held read-only, capture feed owned, one
// normalize -> extract -> classify pipeline per analyze trigger.
pub struct AnalysisSession<S> {
    engine: EmotionEngine,
    feed: CaptureFeed<S>,
    normalizer: Normalizer,
    extractor: FeatureExtractor,
    export_path: Option<PathBuf>,
}

impl<S: CaptureSource> AnalysisSession<S> {
    pub fn new(engine: EmotionEngine, source: S) -> Self {
        let config = *engine.config();
        Self {
            engine,
            feed: CaptureFeed::new(source),
            normalizer: Normalizer::new(config.sample_rate_hz),
            extractor: FeatureExtractor::new(config),
            export_path: None,
        }
    }

    // Render each cycle's normalized waveform to this path for playback.
    pub fn with_export_path(mut self, path: PathBuf) -> Self {
        self.export_path = Some(path);
        self
    }

    pub fn engine(&self) -> &EmotionEngine {
        &self.engine
    }

    pub async fn analyze(&mut self) -> Result<Analysis, PipelineError> {
        self.feed.drain_pending().await;
        let raw = self.feed.take_raw().ok_or(PipelineError::CaptureEmpty)?;

        let waveform = self.normalizer.normalize(raw)?;
        let waveform_duration = waveform.duration();

        let exported_wav = match &self.export_path {
            Some(path) => match wav::export_mono(&waveform, path) {
                Ok(()) => Some(path.clone()),
                Err(e) => {
                    // Playback export is a convenience, not part of the
                    // analysis contract.
                    tracing::warn!(error = %e, path = %path.display(), "wav export failed");
                    None
                }
            },
            None => None,
        };

        let features = self.extractor.extract(&waveform)?;
        let prediction = self.engine.classify(&features)?;
        tracing::info!(
            label = %prediction.label,
            confidence = prediction.confidence,
            duration_ms = waveform_duration.as_millis() as u64,
            "analysis complete"
        );

        Ok(Analysis {
            prediction,
            waveform_duration,
            exported_wav,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;
    use crate::capture::{AudioChunk, ChannelCaptureSource, SampleData, DEFAULT_CHANNEL_CAPACITY};
    use crate::config::HoldoutFraction;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "speech-emotion-pipeline-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    // Tiny synthetic corpus: one tone frequency per emotion code, several
    // takes each, RAVDESS-style names.
    fn write_corpus(dir: &Path) {
        for (code, freq) in [(3u8, 440.0f32), (4, 1200.0), (5, 2800.0)] {
            for take in 0..4 {
                let samples: Vec<f32> = (0..11_025)
                    .map(|i| {
                        let t = i as f32 / 22_050.0;
                        (t * 2.0 * std::f32::consts::PI * freq).sin() * 0.4
                            + (t * 2.0 * std::f32::consts::PI * freq * 2.0).sin()
                                * (0.05 * take as f32)
                    })
                    .collect();
                let name = format!("03-01-{code:02}-01-01-01-{take:02}.wav");
                wav::export_mono(&Waveform::new(samples, 22_050), &dir.join(name)).unwrap();
            }
        }
    }

    fn small_train_config() -> TrainConfig {
        TrainConfig {
            holdout: HoldoutFraction::new(0.25).unwrap(),
            split_seed: 42,
            tree_count: 30,
            forest_seed: 42,
        }
    }

    #[test]
    fn train_and_persist_writes_a_loadable_model() {
        let corpus = temp_dir("train-corpus");
        write_corpus(&corpus);
        let model_path = temp_dir("train-model").join("model.json");

        let report = train_and_persist(
            &corpus,
            &model_path,
            FeatureConfig::default(),
            small_train_config(),
        )
        .unwrap();

        assert_eq!(report.example_count, 12);
        assert_eq!(report.label_count, 3);
        assert!(report.holdout_accuracy.is_some());
        assert!(model_path.exists());

        let engine = EmotionEngine::load(&model_path, &FeatureConfig::default()).unwrap();
        assert_eq!(engine.labels().len(), 3);

        std::fs::remove_dir_all(&corpus).ok();
        std::fs::remove_dir_all(model_path.parent().unwrap()).ok();
    }

    #[test]
    fn persisted_model_recalls_training_examples() {
        let corpus = temp_dir("recall-corpus");
        write_corpus(&corpus);
        let model_path = temp_dir("recall-model").join("model.json");

        train_and_persist(
            &corpus,
            &model_path,
            FeatureConfig::default(),
            small_train_config(),
        )
        .unwrap();

        // Re-extract one training file and check the loaded model maps its
        // exact feature vector back to its label.
        let engine = EmotionEngine::load(&model_path, &FeatureConfig::default()).unwrap();
        let loader_cfg = FeatureConfig::default();
        let normalizer = Normalizer::new(loader_cfg.sample_rate_hz);
        let extractor = FeatureExtractor::new(loader_cfg);
        let raw = wav::decode(&corpus.join("03-01-03-01-01-01-00.wav")).unwrap();
        let features = extractor.extract(&normalizer.normalize(raw).unwrap()).unwrap();
        let prediction = engine.classify(&features).unwrap();
        assert_eq!(prediction.label, Emotion::Happy);

        std::fs::remove_dir_all(&corpus).ok();
        std::fs::remove_dir_all(model_path.parent().unwrap()).ok();
    }

    #[test]
    fn empty_corpus_never_reaches_fitting() {
        let corpus = temp_dir("empty-corpus");
        let model_path = temp_dir("empty-model").join("model.json");

        let err = train_and_persist(
            &corpus,
            &model_path,
            FeatureConfig::default(),
            small_train_config(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Corpus(CorpusError::NoDataFound { .. })
        ));
        assert!(!model_path.exists());

        std::fs::remove_dir_all(&corpus).ok();
        std::fs::remove_dir_all(model_path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn analyze_with_empty_capture_is_capture_empty() {
        let corpus = temp_dir("cap-empty-corpus");
        write_corpus(&corpus);
        let model_path = temp_dir("cap-empty-model").join("model.json");
        train_and_persist(
            &corpus,
            &model_path,
            FeatureConfig::default(),
            small_train_config(),
        )
        .unwrap();

        let engine = EmotionEngine::load(&model_path, &FeatureConfig::default()).unwrap();
        let (tx, source) = ChannelCaptureSource::channel(DEFAULT_CHANNEL_CAPACITY);
        drop(tx);
        let mut session = AnalysisSession::new(engine, source);

        let err = session.analyze().await.unwrap_err();
        assert!(matches!(err, PipelineError::CaptureEmpty));

        std::fs::remove_dir_all(&corpus).ok();
        std::fs::remove_dir_all(model_path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn full_capture_cycle_produces_a_label_and_resets() {
        let corpus = temp_dir("cycle-corpus");
        write_corpus(&corpus);
        let model_path = temp_dir("cycle-model").join("model.json");
        train_and_persist(
            &corpus,
            &model_path,
            FeatureConfig::default(),
            small_train_config(),
        )
        .unwrap();

        let engine = EmotionEngine::load(&model_path, &FeatureConfig::default()).unwrap();
        let (tx, source) = ChannelCaptureSource::channel(DEFAULT_CHANNEL_CAPACITY);
        let export = temp_dir("cycle-export").join("capture.wav");
        let mut session = AnalysisSession::new(engine, source).with_export_path(export.clone());

        // A 48 kHz stereo capture of the "happy" tone, chunked the way a
        // live collaborator would deliver it.
        let stereo: Vec<f32> = (0..48_000)
            .flat_map(|i| {
                let s = (i as f32 / 48_000.0 * 2.0 * std::f32::consts::PI * 440.0).sin() * 0.4;
                [s, s]
            })
            .collect();
        for chunk in stereo.chunks(9600) {
            tx.send(AudioChunk {
                format: crate::audio::PcmFormat {
                    sample_rate: 48_000,
                    channels: 2,
                },
                samples: SampleData::F32(chunk.to_vec()),
            })
            .await
            .unwrap();
        }

        let analysis = session.analyze().await.unwrap();
        assert_eq!(analysis.prediction.label, Emotion::Happy);
        assert_eq!(analysis.exported_wav.as_deref(), Some(export.as_path()));
        assert!(export.exists());
        // Buffer was consumed: an immediate re-analyze has nothing.
        assert!(matches!(
            session.analyze().await.unwrap_err(),
            PipelineError::CaptureEmpty
        ));

        std::fs::remove_dir_all(&corpus).ok();
        std::fs::remove_dir_all(model_path.parent().unwrap()).ok();
        std::fs::remove_dir_all(export.parent().unwrap()).ok();
    }
}
