//! Audio input module.
//!
//! Cross-platform microphone capture using cpal, with resampling via rubato
//! when the device rate differs from the recognizer rate, plus WAV file
//! decoding and header validation for file-based transcription.

mod capture;
pub mod resampler;
pub mod util;
pub mod wav;

pub use capture::Capture;
