//! Utterance segmentation and recognition.
//!
//! Audio flows into Silero VAD, which marks speech/silence and emits one
//! segment per utterance once enough trailing silence is seen. Completed
//! utterances are delivered over a channel and transcribed with Whisper.
//! VAD and Whisper live behind separate locks: VAD is on the audio path and
//! must stay fast, Whisper runs for hundreds of milliseconds per segment.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Minimum speech duration in seconds to be considered valid.
const MIN_SPEECH_DURATION: f32 = 0.1;

/// Maximum speech duration in seconds (bounds runaway segments).
const MAX_SPEECH_DURATION: f32 = 30.0;

/// VAD window size in samples (512 samples = 32ms at 16kHz).
const VAD_WINDOW_SIZE: i32 = 512;

/// Seconds of audio the VAD may accumulate internally.
const VAD_BUFFER_SIZE_SECONDS: f32 = 60.0;

/// One segmented utterance with its approximate position in the stream.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    /// Start time in seconds from the beginning of the stream.
    pub start: f32,
    /// End time in seconds from the beginning of the stream.
    pub end: f32,
}

/// VAD state touched from the audio path.
struct VadState {
    vad: SileroVad,
    was_speaking: bool,
    /// Total samples fed so far, for utterance timing.
    samples_fed: u64,
}

/// Speech recognizer combining VAD segmentation and Whisper decoding.
pub struct Recognizer {
    vad_state: Arc<Mutex<VadState>>,
    whisper: Mutex<WhisperRecognizer>,
    utterance_tx: mpsc::Sender<Utterance>,
    sample_rate: u32,
    /// Samples of trailing silence the VAD requires before closing a segment.
    silence_samples: u64,
    /// Segment length at which the VAD closes an utterance without silence.
    max_speech_samples: u64,
}

impl Recognizer {
    /// Create a recognizer and the channel on which completed utterances
    /// are delivered.
    ///
    /// # Errors
    /// Returns an error if the VAD or Whisper models cannot be loaded.
    pub fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<Utterance>)> {
        let sample_rate = config.sample_rate;
        let provider = config.effective_provider();

        info!("Initializing speech recognizer with {} provider", provider);

        let vad_config = SileroVadConfig {
            model: config.vad_model_path().to_string_lossy().to_string(),
            threshold: config.vad_threshold,
            sample_rate,
            min_silence_duration: config.vad_silence_duration,
            min_speech_duration: MIN_SPEECH_DURATION,
            max_speech_duration: MAX_SPEECH_DURATION,
            window_size: VAD_WINDOW_SIZE,
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.vad_threads.try_into().unwrap_or(1)),
            debug: config.verbose,
        };

        let vad = SileroVad::new(vad_config, VAD_BUFFER_SIZE_SECONDS).map_err(|e| anyhow::anyhow!("Failed to initialize Silero VAD: {}", e))?;

        debug!("VAD initialized");

        let stt_language = config.effective_stt_language().to_string();

        let whisper_config = WhisperConfig {
            encoder: config.whisper_encoder_path().to_string_lossy().to_string(),
            decoder: config.whisper_decoder_path().to_string_lossy().to_string(),
            tokens: config.whisper_tokens_path().to_string_lossy().to_string(),
            language: stt_language,
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.stt_threads.try_into().unwrap_or(2)),
            debug: config.verbose,
            ..Default::default()
        };

        let whisper = WhisperRecognizer::new(whisper_config).map_err(|e| anyhow::anyhow!("Failed to initialize Whisper: {}", e))?;

        debug!("Whisper recognizer initialized");

        let (utterance_tx, utterance_rx) = mpsc::channel(5);

        let recognizer = Self {
            vad_state: Arc::new(Mutex::new(VadState { vad, was_speaking: false, samples_fed: 0 })),
            whisper: Mutex::new(whisper),
            utterance_tx,
            sample_rate,
            silence_samples: (config.vad_silence_duration * sample_rate as f32) as u64,
            max_speech_samples: (MAX_SPEECH_DURATION * sample_rate as f32) as u64,
        };

        Ok((recognizer, utterance_rx))
    }

    /// Feed audio samples to the VAD. Completed utterances are sent on the
    /// channel as soon as the VAD closes them.
    ///
    /// Called from the capture thread; must not block on Whisper.
    pub fn accept_waveform(&self, samples: &[f32]) {
        let mut state = self.vad_state.lock();
        state.vad.accept_waveform(samples.to_vec());
        state.samples_fed += samples.len() as u64;

        let in_speech = state.vad.is_speech();
        if in_speech && !state.was_speaking {
            info!("Listening...");
        }
        state.was_speaking = in_speech;

        while !state.vad.is_empty() {
            let segment = state.vad.front();
            state.vad.pop();

            if segment.samples.is_empty() {
                debug!("Dropping empty segment");
                continue;
            }

            let utterance = self.locate(segment.samples, state.samples_fed);
            debug!("Utterance completed: {} samples ({:.2}s - {:.2}s)", utterance.samples.len(), utterance.start, utterance.end);

            // Drop the VAD lock before handing off; try_send keeps the
            // audio path non-blocking
            drop(state);

            if let Err(e) = self.utterance_tx.try_send(utterance) {
                warn!("Failed to queue utterance (channel full): {}", e);
            }

            info!("Ready...");
            state = self.vad_state.lock();
        }
    }

    /// Flush the stream at end of input by feeding enough silence for the
    /// VAD to close any utterance still in progress. File mode only.
    pub fn flush(&self) {
        // One extra second beyond the configured silence gap
        let pad = (self.silence_samples + self.sample_rate as u64) as usize;
        let zeros = vec![0.0f32; 2048];
        let mut remaining = pad;
        while remaining > 0 {
            let n = remaining.min(zeros.len());
            self.accept_waveform(&zeros[..n]);
            remaining -= n;
        }
    }

    /// Run Whisper on an utterance. Returns the trimmed hypothesis, or None
    /// when the decoder produced nothing.
    pub fn transcribe(&self, samples: &[f32]) -> Option<String> {
        if samples.is_empty() {
            debug!("Empty speech segment");
            return None;
        }

        debug!("Transcribing {} samples", samples.len());

        let mut whisper = self.whisper.lock();
        let result = whisper.transcribe(self.sample_rate, samples);
        drop(whisper);

        let text = result.text.trim().to_string();
        if text.is_empty() {
            debug!("Empty hypothesis");
            return None;
        }

        Some(text)
    }

    /// Place a segment on the stream timeline.
    fn locate(&self, samples: Vec<f32>, fed: u64) -> Utterance {
        let rate = self.sample_rate as f32;
        let (start_sample, end_sample) = segment_span(samples.len() as u64, fed, self.silence_samples, self.max_speech_samples);
        Utterance { start: start_sample as f32 / rate, end: end_sample as f32 / rate, samples }
    }
}

/// Compute a segment's start/end sample offsets from the feed position at
/// which the VAD closed it.
///
/// A segment normally closes after the trailing silence gap, so its end lies
/// that far before the feed position. A segment that reached the maximum
/// speech duration closes immediately, with no gap to subtract.
fn segment_span(len: u64, fed: u64, silence_samples: u64, max_speech_samples: u64) -> (u64, u64) {
    let end = if len >= max_speech_samples { fed } else { fed.saturating_sub(silence_samples) };
    let start = end.saturating_sub(len);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1s silence gap, 30s cap, at 16kHz
    const SILENCE: u64 = 16000;
    const CAP: u64 = 30 * 16000;

    #[test]
    fn test_silence_closed_segment_ends_before_gap() {
        // 2s utterance closed after the 1s gap, 4s into the stream
        let (start, end) = segment_span(32000, 64000, SILENCE, CAP);
        assert_eq!(end, 48000);
        assert_eq!(start, 16000);
    }

    #[test]
    fn test_capped_segment_ends_at_feed_position() {
        // A 30s segment hit the duration cap; no trailing silence to subtract
        let (start, end) = segment_span(CAP, CAP + 8000, SILENCE, CAP);
        assert_eq!(end, CAP + 8000);
        assert_eq!(start, 8000);
    }

    #[test]
    fn test_span_never_underflows() {
        // Segment closed so early that the gap would reach before the stream start
        let (start, end) = segment_span(8000, 4000, SILENCE, CAP);
        assert_eq!(end, 0);
        assert_eq!(start, 0);
    }
}
