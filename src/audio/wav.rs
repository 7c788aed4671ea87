//! WAV file decoding with header validation.
//!
//! File input must match what the recognizer was configured for: 16-bit
//! integer PCM, single channel, at the expected sample rate. Anything else
//! is rejected with an error naming the offending header field.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

/// A WAV file that failed the header sanity check, or could not be read.
#[derive(Debug, Error)]
pub enum WavError {
    #[error("Input audio file has {0} bits per sample instead of 16")]
    BitsPerSample(u16),

    #[error("Input audio file has float samples and not required integer PCM")]
    NotPcm,

    #[error("Input audio file has {0} channels, expected single channel mono")]
    Channels(u16),

    #[error("Input audio file has sample rate {found}, but decoder expects {expected}")]
    SampleRate { found: u32, expected: u32 },

    #[error("Failed to read WAV file: {0}")]
    Read(#[from] hound::Error),
}

/// Read a mono 16-bit PCM WAV file, validating the header against
/// `expected_rate`, and decode the samples to f32 in -1.0..1.0.
pub fn read_mono_wav(path: &Path, expected_rate: u32) -> Result<Vec<f32>, WavError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 {
        return Err(WavError::BitsPerSample(spec.bits_per_sample));
    }
    if spec.sample_format != SampleFormat::Int {
        return Err(WavError::NotPcm);
    }
    if spec.channels != 1 {
        return Err(WavError::Channels(spec.channels));
    }
    if spec.sample_rate != expected_rate {
        return Err(WavError::SampleRate { found: spec.sample_rate, expected: expected_rate });
    }

    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok(samples?.into_iter().map(|s| s as f32 / 32768.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, spec: WavSpec, samples: &[i16]) -> PathBuf {
        let path = dir.join(name);
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn mono_spec(sample_rate: u32) -> WavSpec {
        WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int }
    }

    #[test]
    fn test_valid_file_decodes_to_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "ok.wav", mono_spec(16000), &[0, 16384, -16384, i16::MIN]);

        let samples = read_mono_wav(&path, 16000).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 0.5).abs() < 1e-4);
        assert!((samples[2] + 0.5).abs() < 1e-4);
        assert_eq!(samples[3], -1.0);
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "rate.wav", mono_spec(44100), &[0; 8]);

        match read_mono_wav(&path, 16000) {
            Err(WavError::SampleRate { found: 44100, expected: 16000 }) => {}
            other => panic!("expected sample rate error, got {:?}", other),
        }
    }

    #[test]
    fn test_stereo_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WavSpec { channels: 2, ..mono_spec(16000) };
        let path = write_wav(dir.path(), "stereo.wav", spec, &[0; 8]);

        match read_mono_wav(&path, 16000) {
            Err(WavError::Channels(2)) => {}
            other => panic!("expected channel error, got {:?}", other),
        }
    }

    #[test]
    fn test_eight_bit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WavSpec { bits_per_sample: 8, ..mono_spec(16000) };
        let path = dir.path().join("8bit.wav");
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0i8).unwrap();
        }
        writer.finalize().unwrap();

        match read_mono_wav(&path, 16000) {
            Err(WavError::BitsPerSample(8)) => {}
            other => panic!("expected bits-per-sample error, got {:?}", other),
        }
    }

    #[test]
    fn test_float_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WavSpec { channels: 1, sample_rate: 16000, bits_per_sample: 32, sample_format: SampleFormat::Float };
        let path = dir.path().join("float.wav");
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();

        // 32-bit is caught before the sample format check
        match read_mono_wav(&path, 16000) {
            Err(WavError::BitsPerSample(32)) => {}
            other => panic!("expected bits-per-sample error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        match read_mono_wav(&dir.path().join("missing.wav"), 16000) {
            Err(WavError::Read(_)) => {}
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
