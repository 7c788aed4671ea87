//! Speech-to-text module using sherpa-rs.
//!
//! Silero VAD segments the audio stream into utterances; Whisper produces
//! a hypothesis string for each one.

mod recognizer;

pub use recognizer::{Recognizer, Utterance};
