//! Voice Trigger - a voice-activated command trigger.
//!
//! Continuously samples the microphone, segments the stream into utterances
//! with Silero VAD, transcribes each utterance with Whisper, and exits once
//! a hypothesis matches the configured trigger phrase. A WAV file can be
//! transcribed instead of the microphone with --infile.

mod audio;
mod config;
mod stt;
mod trigger;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::signal;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::Capture;
use config::AppConfig;
use stt::{Recognizer, Utterance};
use trigger::TriggerMatcher;

/// Spawn the transcription task.
///
/// Receives completed utterances from the VAD, transcribes them, and fires
/// `matched` when a hypothesis equals the trigger phrase.
fn spawn_transcription_task(
    mut utterance_rx: mpsc::Receiver<Utterance>,
    recognizer: Arc<Recognizer>,
    matcher: TriggerMatcher,
    matched: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !shutdown.load(Ordering::Relaxed) {
            // Timeout so the shutdown flag is checked periodically
            match tokio::time::timeout(tokio::time::Duration::from_millis(100), utterance_rx.recv()).await {
                Ok(Some(utterance)) => {
                    let recognizer = recognizer.clone();
                    // Whisper is blocking work; keep it off the async threads
                    let hypothesis = tokio::task::spawn_blocking(move || recognizer.transcribe(&utterance.samples)).await.ok().flatten();

                    if let Some(text) = hypothesis {
                        info!("Heard: \"{}\"", text);
                        if matcher.matches(&text) {
                            matched.notify_one();
                            break;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Utterance channel closed");
                    break;
                }
                Err(_) => continue,
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Listen on the microphone until the trigger phrase is heard or a signal
/// arrives. Returns true when the trigger matched.
async fn run_microphone(config: &AppConfig) -> Result<bool> {
    let (recognizer, utterance_rx) = Recognizer::new(config)?;
    let recognizer = Arc::new(recognizer);

    let recognizer_for_audio = recognizer.clone();
    let mut capture = Capture::new(config.sample_rate, config.device.as_deref(), move |samples: &[f32]| {
        recognizer_for_audio.accept_waveform(samples);
    })?;

    let matcher = TriggerMatcher::new(&config.trigger, config.match_mode);
    let matched = Arc::new(Notify::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    capture.start()?;
    info!("Ready...");

    let transcription_handle = spawn_transcription_task(utterance_rx, recognizer, matcher, matched.clone(), shutdown.clone());

    let hit = tokio::select! {
        _ = matched.notified() => true,
        _ = wait_for_signal() => false,
    };

    shutdown.store(true, Ordering::SeqCst);
    capture.shutdown();

    // Let the transcription task notice the flag before giving up on it
    let graceful_timeout = tokio::time::Duration::from_millis(500);
    tokio::select! {
        _ = transcription_handle => {
            debug!("Transcription task finished gracefully");
        }
        _ = tokio::time::sleep(graceful_timeout) => {
            debug!("Transcription task didn't finish in time");
        }
    }

    Ok(hit)
}

/// Transcribe a WAV file utterance by utterance. Returns true when some
/// hypothesis matched the trigger phrase.
fn run_file(config: &AppConfig) -> Result<bool> {
    let infile = config.infile.as_ref().expect("run_file requires --infile");

    let samples = audio::wav::read_mono_wav(infile, config.sample_rate)?;
    info!("Transcribing {} ({:.1}s of audio)", infile.display(), samples.len() as f32 / config.sample_rate as f32);

    let (recognizer, mut utterance_rx) = Recognizer::new(config)?;
    let matcher = TriggerMatcher::new(&config.trigger, config.match_mode);

    let mut hit = false;

    for chunk in samples.chunks(2048) {
        recognizer.accept_waveform(chunk);
        while let Ok(utterance) = utterance_rx.try_recv() {
            hit |= emit_utterance(&recognizer, &matcher, config.time, &utterance);
        }
        if hit {
            return Ok(true);
        }
    }

    // Push trailing silence through the VAD to close the final utterance
    recognizer.flush();
    while let Ok(utterance) = utterance_rx.try_recv() {
        hit |= emit_utterance(&recognizer, &matcher, config.time, &utterance);
    }

    Ok(hit)
}

/// Transcribe one utterance, print the hypothesis, and report whether it
/// matched the trigger phrase.
fn emit_utterance(recognizer: &Recognizer, matcher: &TriggerMatcher, show_time: bool, utterance: &Utterance) -> bool {
    let Some(text) = recognizer.transcribe(&utterance.samples) else {
        return false;
    };

    if show_time {
        println!("{:.2} {:.2} {}", utterance.start, utterance.end, text);
    } else {
        println!("{}", text);
    }

    matcher.matches(&text)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_args();

    // Respect RUST_LOG, fall back to the verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("Voice Trigger v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    config.log_config();

    let hit = if config.infile.is_some() {
        tokio::task::block_in_place(|| run_file(&config))?
    } else {
        run_microphone(&config).await?
    };

    if hit {
        info!("Trigger phrase \"{}\" matched, stop listening", config.trigger);
    } else {
        warn!("Stopped without hearing the trigger phrase");
    }

    Ok(())
}
