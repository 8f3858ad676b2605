use crate::audio::normalize::Normalizer;
use crate::audio::{wav, AudioError};
use crate::config::{FeatureConfig, HoldoutFraction};
use crate::emotion::Emotion;
use crate::features::{FeatureError, FeatureExtractor, FeatureVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

pub const CORPUS_EXTENSION: &str = "wav";

#[derive(Clone, Debug, PartialEq)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub label: Emotion,
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub examples: Vec<LabeledExample>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    // Seeded shuffle, then a holdout tail of ceil(n * fraction) examples
    // (capped so the training side is never empty). The same seed over the
    // same examples always produces the same partition.
    pub fn split(
        self,
        holdout: HoldoutFraction,
        seed: u64,
    ) -> (Vec<LabeledExample>, Vec<LabeledExample>) {
        let mut examples = self.examples;
        let mut rng = StdRng::seed_from_u64(seed);
        examples.shuffle(&mut rng);

        let n = examples.len();
        let mut holdout_count = (n as f32 * holdout.get()).ceil() as usize;
        if n > 0 {
            holdout_count = holdout_count.min(n - 1);
        }
        let held = examples.split_off(n - holdout_count);
        (examples, held)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CorpusError {
    #[error("no usable audio files found under {root}")]
    NoDataFound { root: PathBuf },

    #[error("corpus root {root} is not readable: {details}")]
    RootUnreadable { root: PathBuf, details: String },
}

#[derive(thiserror::Error, Debug)]
enum FileError {
    #[error("filename does not follow the <x>-<x>-<code>-... convention")]
    MalformedName,

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

// Third hyphen-delimited segment of the file stem is the emotion code.
// None means the name does not follow the convention at all; a numeric
// code outside the table still parses, to Unknown.
pub fn label_from_filename(path: &Path) -> Option<Emotion> {
    let stem = path.file_stem()?.to_str()?;
    let mut segments = stem.split('-');
    let code = segments.nth(2)?;
    let code: u8 = code.trim().parse().ok()?;
    Some(Emotion::from_code(code))
}

pub struct CorpusLoader {
    normalizer: Normalizer,
    extractor: FeatureExtractor,
}

impl CorpusLoader {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.sample_rate_hz),
            extractor: FeatureExtractor::new(config),
        }
    }

    // Walk the corpus and produce one labeled example per readable file.
    // A bad file is skipped with a diagnostic; an empty result is fatal,
    // training must never proceed on zero examples.
    pub fn load(&self, root: &Path) -> Result<Dataset, CorpusError> {
        let mut files = Vec::new();
        collect_audio_files(root, &mut files).map_err(|e| CorpusError::RootUnreadable {
            root: root.to_path_buf(),
            details: e.to_string(),
        })?;
        files.sort();

        let mut examples = Vec::with_capacity(files.len());
        let mut unknown_count = 0usize;
        for file in &files {
            match self.load_file(file) {
                Ok(example) => {
                    if example.label == Emotion::Unknown {
                        unknown_count += 1;
                    }
                    examples.push(example);
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "skipping corpus file");
                }
            }
        }

        if unknown_count > 0 {
            tracing::warn!(
                unknown_count,
                total = examples.len(),
                "corpus contains files with out-of-table emotion codes, kept as 'unknown'"
            );
        }

        if examples.is_empty() {
            return Err(CorpusError::NoDataFound {
                root: root.to_path_buf(),
            });
        }

        tracing::info!(examples = examples.len(), root = %root.display(), "corpus loaded");
        Ok(Dataset { examples })
    }

    fn load_file(&self, path: &Path) -> Result<LabeledExample, FileError> {
        let label = label_from_filename(path).ok_or(FileError::MalformedName)?;
        let raw = wav::decode(path)?;
        let waveform = self.normalizer.normalize(raw)?;
        let features = self.extractor.extract(&waveform)?;
        Ok(LabeledExample { features, label })
    }
}

fn collect_audio_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if let Err(e) = collect_audio_files(&path, out) {
                tracing::warn!(dir = %path.display(), error = %e, "skipping unreadable subdirectory");
            }
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CORPUS_EXTENSION))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;

    fn example(label: Emotion, seed: f32) -> LabeledExample {
        LabeledExample {
            features: FeatureVector::new(vec![seed; 40]),
            label,
        }
    }

    #[test]
    fn filename_code_03_is_happy() {
        let label = label_from_filename(Path::new("data/03-01-03-01-02-01-12.wav"));
        assert_eq!(label, Some(Emotion::Happy));
    }

    #[test]
    fn filename_code_09_is_unknown() {
        let label = label_from_filename(Path::new("03-01-09-01-02-01-12.wav"));
        assert_eq!(label, Some(Emotion::Unknown));
    }

    #[test]
    fn filename_without_three_segments_is_malformed() {
        assert_eq!(label_from_filename(Path::new("recording.wav")), None);
        assert_eq!(label_from_filename(Path::new("a-b.wav")), None);
        assert_eq!(label_from_filename(Path::new("a-b-xx.wav")), None);
    }

    #[test]
    fn split_is_deterministic_for_a_fixed_seed() {
        let make = || Dataset {
            examples: (0..50u8)
                .map(|i| example(Emotion::from_code((i % 8) + 1), f32::from(i)))
                .collect(),
        };
        let holdout = HoldoutFraction::default();
        let (train_a, held_a) = make().split(holdout, 42);
        let (train_b, held_b) = make().split(holdout, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(held_a, held_b);
        assert_eq!(held_a.len(), 10);
        assert_eq!(train_a.len(), 40);
    }

    #[test]
    fn split_keeps_training_side_nonempty() {
        let dataset = Dataset {
            examples: vec![example(Emotion::Happy, 0.0), example(Emotion::Sad, 1.0)],
        };
        let (train, held) = dataset.split(HoldoutFraction::new(0.9).unwrap(), 7);
        assert_eq!(train.len(), 1);
        assert_eq!(held.len(), 1);
    }

    #[test]
    fn empty_directory_is_no_data_found() {
        let dir = std::env::temp_dir().join(format!(
            "speech-emotion-corpus-empty-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let loader = CorpusLoader::new(FeatureConfig::default());
        let err = loader.load(&dir).unwrap_err();
        assert!(matches!(err, CorpusError::NoDataFound { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn loads_labeled_examples_and_skips_malformed_names() {
        let dir = std::env::temp_dir().join(format!(
            "speech-emotion-corpus-load-{}",
            std::process::id()
        ));
        let nested = dir.join("actor_01");
        std::fs::create_dir_all(&nested).unwrap();

        let write_tone = |path: &Path, freq: f32| {
            let samples: Vec<f32> = (0..11_025)
                .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * freq / 22_050.0).sin() * 0.4)
                .collect();
            wav::export_mono(&Waveform::new(samples, 22_050), path).unwrap();
        };

        write_tone(&nested.join("03-01-03-01-01-01-01.wav"), 440.0);
        write_tone(&nested.join("03-01-04-01-01-01-01.wav"), 880.0);
        write_tone(&dir.join("notes.wav"), 220.0); // malformed name, skipped
        std::fs::write(dir.join("readme.txt"), "not audio").unwrap();

        let loader = CorpusLoader::new(FeatureConfig::default());
        let dataset = loader.load(&dir).unwrap();
        assert_eq!(dataset.len(), 2);
        let mut labels: Vec<Emotion> = dataset.examples.iter().map(|e| e.label).collect();
        labels.sort();
        assert_eq!(labels, vec![Emotion::Happy, Emotion::Sad]);
        for e in &dataset.examples {
            assert_eq!(e.features.len(), 40);
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
