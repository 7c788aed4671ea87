//! Streaming audio resampling using the rubato FFT resampler.
//!
//! Capture callbacks deliver variable-size chunks; the resampler accumulates
//! them internally and emits output whenever a full FFT chunk is available.

use std::sync::Arc;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use parking_lot::Mutex;
use rubato::{Fft, FixedSync, Resampler};

/// FFT chunk size (good quality/performance tradeoff).
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality, more CPU).
const SUB_CHUNKS: usize = 2;

/// Stateful mono resampler for use inside audio callbacks.
pub struct StreamResampler {
    resampler: Fft<f32>,
    output_buffer: Vec<f32>,
    output_frames_max: usize,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler converting `from_rate` to `to_rate`, wrapped for
    /// shared access from the capture callback.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Arc<Mutex<Self>>> {
        let resampler = Fft::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            SUB_CHUNKS,
            1, // mono
            FixedSync::Input,
        )
        .context("Failed to create resampler")?;

        let output_frames_max = resampler.output_frames_max();

        Ok(Arc::new(Mutex::new(Self {
            resampler,
            output_buffer: vec![0.0f32; output_frames_max],
            output_frames_max,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })))
    }

    /// Feed input samples; returns resampled output once a full chunk has
    /// accumulated, or `None` while more input is needed.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        if self.pending.len() < CHUNK_SIZE {
            return None;
        }

        let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();

        let input_adapter = InterleavedSlice::new(&chunk, 1, CHUNK_SIZE).ok()?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.output_buffer, 1, self.output_frames_max).ok()?;

        let (_, frames_written) = self.resampler.process_into_buffer(&input_adapter, &mut output_adapter, None).ok()?;

        if frames_written > 0 { Some(self.output_buffer[..frames_written].to_vec()) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_downsampling_ratio() {
        // 48kHz -> 16kHz should produce roughly a third of the input
        let state = StreamResampler::new(48000, 16000).unwrap();
        let mut resampler = state.lock();

        let mut produced = 0usize;
        let fed = CHUNK_SIZE * 12;
        for _ in 0..12 {
            if let Some(out) = resampler.process(&vec![0.0f32; CHUNK_SIZE]) {
                produced += out.len();
            }
        }
        // Allow slack for FFT startup latency
        assert!(produced >= fed / 3 - CHUNK_SIZE && produced <= fed / 3 + CHUNK_SIZE, "unexpected output length {}", produced);
    }

    #[test]
    fn test_partial_chunks_accumulate() {
        let state = StreamResampler::new(44100, 16000).unwrap();
        let mut resampler = state.lock();

        // Less than a chunk yields nothing
        assert!(resampler.process(&vec![0.0f32; CHUNK_SIZE / 2]).is_none());
        // Second half completes the chunk
        assert!(resampler.process(&vec![0.0f32; CHUNK_SIZE / 2]).is_some());
    }
}
