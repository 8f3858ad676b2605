#![deny(warnings)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use speech_emotion_core::audio::wav;
use speech_emotion_core::capture::{
    AudioChunk, ChannelCaptureSource, SampleData, DEFAULT_CHANNEL_CAPACITY,
};
use speech_emotion_core::config::{
    resolve_model_path, Env, FeatureConfig, HoldoutFraction, StdEnv, TrainConfig,
    DEFAULT_HOLDOUT_FRACTION, DEFAULT_SPLIT_SEED, DEFAULT_TREE_COUNT,
};
use speech_emotion_core::engine::EmotionEngine;
use speech_emotion_core::pipeline::{train_and_persist, AnalysisSession, PipelineError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speech-emotion")]
#[command(about = "Voice emotion classification: corpus training and capture analysis")]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a classifier from a labeled corpus and persist it.
    Train {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long)]
        model: Option<String>,

        #[arg(long, default_value_t = DEFAULT_HOLDOUT_FRACTION)]
        holdout: f32,

        #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
        seed: u64,

        #[arg(long, default_value_t = DEFAULT_TREE_COUNT)]
        trees: usize,
    },
    /// Run one analysis cycle over a recorded WAV file.
    Analyze {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        export_wav: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;
    let env = StdEnv;

    match args.command {
        Command::Train {
            corpus,
            model,
            holdout,
            seed,
            trees,
        } => run_train(corpus, model, holdout, seed, trees, &env),
        Command::Analyze {
            input,
            model,
            export_wav,
        } => run_analyze(input, model, export_wav, &env).await,
    }
}

fn run_train(
    corpus: PathBuf,
    model: Option<String>,
    holdout: f32,
    seed: u64,
    trees: usize,
    env: &impl Env,
) -> anyhow::Result<()> {
    let model_path = resolve_model_path(model, env);
    let train = TrainConfig::new(HoldoutFraction::new(holdout)?, seed, trees, seed)?;

    let report = train_and_persist(&corpus, &model_path, FeatureConfig::default(), train)
        .with_context(|| format!("training from corpus {}", corpus.display()))?;

    println!(
        "trained on {} examples ({} labels), {} held out",
        report.train_count, report.label_count, report.holdout_count
    );
    match report.holdout_accuracy {
        Some(acc) => println!("model accuracy: {:.2}%", acc * 100.0),
        None => println!("model accuracy: n/a (holdout set empty)"),
    }
    println!("model saved to {}", report.model_path.display());
    Ok(())
}

async fn run_analyze(
    input: PathBuf,
    model: Option<String>,
    export_wav: Option<PathBuf>,
    env: &impl Env,
) -> anyhow::Result<()> {
    let model_path = resolve_model_path(model, env);
    let config = FeatureConfig::default();
    let engine = EmotionEngine::load(&model_path, &config)
        .with_context(|| format!("loading model {}", model_path.display()))?;

    let (tx, source) = ChannelCaptureSource::channel(DEFAULT_CHANNEL_CAPACITY);
    let mut session = AnalysisSession::new(engine, source);
    if let Some(path) = export_wav {
        session = session.with_export_path(path);
    }

    // Stand in for the live capture collaborator: deliver the recording in
    // roughly 100 ms chunks of interleaved samples.
    let raw = wav::decode(&input).with_context(|| format!("decoding {}", input.display()))?;
    let chunk_len =
        (raw.format.sample_rate as usize / 10).max(1) * usize::from(raw.format.channels.max(1));
    let feeder = tokio::spawn(async move {
        for chunk in raw.samples.chunks(chunk_len) {
            if tx
                .send(AudioChunk {
                    format: raw.format,
                    samples: SampleData::F32(chunk.to_vec()),
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let analysis = match session.analyze().await {
        Ok(analysis) => analysis,
        Err(PipelineError::CaptureEmpty) => {
            println!("no audio captured, record something first");
            feeder.await.ok();
            return Ok(());
        }
        Err(e) => return Err(e).context("analysis failed"),
    };
    feeder.await.ok();

    println!(
        "predicted emotion: {} ({:.1}% confidence, {:.2}s of audio)",
        analysis.prediction.label,
        analysis.prediction.confidence * 100.0,
        analysis.waveform_duration.as_secs_f32()
    );
    for (label, p) in &analysis.prediction.distribution {
        println!("  {label:<10} {:>5.1}%", p * 100.0);
    }
    if let Some(path) = analysis.exported_wav {
        println!("normalized capture written to {}", path.display());
    }
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
