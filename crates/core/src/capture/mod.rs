use crate::audio::{i16_to_f32_pcm, PcmFormat, RawAudio};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tokio::sync::mpsc;

// Bounded wait per drain poll. Absence of a chunk within this window just
// means "nothing more right now", not an error.
pub const DRAIN_POLL_TIMEOUT: Duration = Duration::from_millis(25);

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum SampleData {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::I16(v) => v.len(),
            SampleData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Integer payloads are scaled by the 16-bit full-scale value here;
    // float payloads pass through and the normalizer handles any leftover
    // integer-range scaling.
    pub fn into_f32(self) -> Vec<f32> {
        match self {
            SampleData::I16(v) => i16_to_f32_pcm(&v),
            SampleData::F32(v) => v,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub format: PcmFormat,
    pub samples: SampleData,
}

pub trait CaptureSource: Send {
    // Resolves to None when no chunk arrives within the bounded wait or the
    // collaborator has hung up.
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<AudioChunk>>;
}

pub struct ChannelCaptureSource {
    rx: mpsc::Receiver<AudioChunk>,
}

impl ChannelCaptureSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<AudioChunk>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl CaptureSource for ChannelCaptureSource {
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<AudioChunk>> {
        async move {
            match tokio::time::timeout(DRAIN_POLL_TIMEOUT, self.rx.recv()).await {
                Ok(chunk) => chunk,
                Err(_) => None,
            }
        }
        .boxed()
    }
}

// Owns the accumulated capture between analysis triggers. The capture path
// fills it through drain_pending; the analysis pipeline takes the whole
// buffer with take_raw, which resets the feed for the next cycle.
pub struct CaptureFeed<S> {
    source: S,
    format: Option<PcmFormat>,
    samples: Vec<f32>,
}

impl<S: CaptureSource> CaptureFeed<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            format: None,
            samples: Vec::new(),
        }
    }

    pub async fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while let Some(chunk) = self.source.next_chunk().await {
            self.push(chunk);
            drained += 1;
        }
        drained
    }

    fn push(&mut self, chunk: AudioChunk) {
        match self.format {
            None => self.format = Some(chunk.format),
            Some(format) if format != chunk.format => {
                tracing::warn!(
                    expected = ?format,
                    got = ?chunk.format,
                    "capture chunk format changed mid-cycle, dropping chunk"
                );
                return;
            }
            Some(_) => {}
        }
        self.samples.extend(chunk.samples.into_f32());
    }

    pub fn buffered_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    // Ownership handoff to the analysis pipeline. None when nothing has
    // been captured since the last take.
    pub fn take_raw(&mut self) -> Option<RawAudio> {
        let format = self.format.take()?;
        let samples = std::mem::take(&mut self.samples);
        if samples.is_empty() {
            return None;
        }
        Some(RawAudio { format, samples })
    }
}
