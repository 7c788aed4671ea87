//! Microphone capture using cpal.
//!
//! Streams samples from the default input device into a caller-provided
//! callback. The cpal callback pushes into a lock-free ring buffer; a drain
//! thread pulls from it and forwards chunks over a bounded channel so the
//! audio callback never blocks on downstream work (VAD locks, decoding).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::StreamResampler;
use super::util::{downmix_to_mono, find_best_config, get_device_name};

/// Ring buffer capacity in samples (~4 seconds at 16kHz).
const RING_CAPACITY: usize = 65536;

/// Bounded channel depth between drain thread and callback thread
/// (32 chunks is roughly one second of audio).
const CHANNEL_DEPTH: usize = 32;

/// Microphone capture handle.
///
/// Owns the cpal stream and the two worker threads. Dropping the handle
/// shuts everything down.
pub struct Capture {
    stream: Stream,
    shutdown: Arc<AtomicBool>,
    drain_handle: Option<std::thread::JoinHandle<()>>,
    callback_handle: Option<std::thread::JoinHandle<()>>,
    consumer: Option<ringbuf::HeapCons<f32>>,
    sender: Option<SyncSender<Vec<f32>>>,
}

impl Capture {
    /// Open an input device and prepare a capture stream.
    ///
    /// `device_name` selects an input device by name; the default input
    /// device is used when it is None. `sample_rate` is the rate the
    /// callback receives (16000 for STT); the device rate is resampled to
    /// it when they differ. The stream does not run until
    /// [`Capture::start`] is called.
    ///
    /// # Errors
    /// Returns an error if the requested device is not found, no usable
    /// stream configuration is found, or the input stream cannot be built.
    pub fn new<F>(sample_rate: u32, device_name: Option<&str>, callback: F) -> Result<Self>
    where
        F: Fn(&[f32]) + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<Vec<f32>>(CHANNEL_DEPTH);

        // Separate thread for the user callback so channel consumption is
        // decoupled from whatever locks the callback takes
        let callback_handle = std::thread::spawn(move || {
            while let Ok(samples) = receiver.recv() {
                callback(&samples);
            }
            debug!("Audio callback thread exiting");
        });

        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|d| get_device_name(d) == name)
                .with_context(|| format!("Input device not found: {}", name))?,
            None => host.default_input_device().context("No input device available")?,
        };

        info!("Using input device: {}", get_device_name(&device));

        let supported_configs = device.supported_input_configs().context("Failed to get supported input configs")?;
        let config = find_best_config(supported_configs, sample_rate)?;
        let device_sample_rate = config.sample_rate();

        let needs_resampling = device_sample_rate != sample_rate;
        if needs_resampling {
            info!("Device sample rate {} Hz differs from target {} Hz - resampling will be applied", device_sample_rate, sample_rate);
        }

        debug!("Audio capture config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_stream = shutdown.clone();
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let err_fn = |err| {
            tracing::error!("Audio capture error: {}", err);
        };

        let ring = HeapRb::<f32>::new(RING_CAPACITY);
        let (mut producer, consumer) = ring.split();

        let resampler = if needs_resampling { Some(StreamResampler::new(device_sample_rate, sample_rate)?) } else { None };

        // F32 input is guaranteed by find_best_config
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if shutdown_for_stream.load(Ordering::Relaxed) {
                    return;
                }
                let mono = downmix_to_mono(data, channels);

                let samples = match &resampler {
                    Some(state) => state.lock().process(&mono),
                    None => Some(mono),
                };

                if let Some(samples) = samples {
                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        // Ring buffer full; count drops and log occasionally
                        static DROP_COUNT: AtomicU64 = AtomicU64::new(0);
                        let count = DROP_COUNT.fetch_add(1, Ordering::Relaxed);
                        if count.is_multiple_of(100) {
                            tracing::warn!("Ring buffer full, dropped {} audio chunks", count + 1);
                        }
                    }
                }
            },
            err_fn,
            None,
        )?;

        info!("Audio capture configured: device {} Hz -> output {} Hz", device_sample_rate, sample_rate);

        Ok(Self {
            stream,
            shutdown,
            drain_handle: None,
            callback_handle: Some(callback_handle),
            consumer: Some(consumer),
            sender: Some(sender),
        })
    }

    /// Start capturing audio.
    pub fn start(&mut self) -> Result<()> {
        self.stream.play().context("Failed to start audio stream")?;

        if self.drain_handle.is_none() {
            let consumer = self.consumer.take().context("Consumer already taken")?;
            let sender = self.sender.take().context("Sender already taken")?;
            let drain_shutdown = self.shutdown.clone();

            let drain_handle = std::thread::spawn(move || {
                let mut consumer = consumer;
                let mut read_buffer = vec![0.0f32; 2048];

                loop {
                    if drain_shutdown.load(Ordering::Relaxed) {
                        debug!("Drain thread shutting down");
                        return;
                    }

                    let available = consumer.occupied_len();
                    if available == 0 {
                        // 100us keeps latency low without busy-spinning
                        std::thread::sleep(std::time::Duration::from_micros(100));
                        continue;
                    }

                    let to_read = available.min(read_buffer.len());
                    let read = consumer.pop_slice(&mut read_buffer[..to_read]);

                    if read > 0 {
                        // Blocks when the channel is full, which is the
                        // backpressure we want here
                        if sender.send(read_buffer[..read].to_vec()).is_err() {
                            debug!("Audio channel closed, drain thread exiting");
                            return;
                        }
                    }
                }
            });

            self.drain_handle = Some(drain_handle);
            info!("Audio capture started");
        }

        Ok(())
    }

    /// Permanently stop capture and join the worker threads.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.stream.pause();

        // Dropping the sender wakes the callback thread out of recv()
        drop(self.sender.take());

        if let Some(handle) = self.drain_handle.take() {
            std::thread::sleep(std::time::Duration::from_millis(100));
            if !handle.is_finished() {
                warn!("Drain thread didn't exit in time");
            }
            if let Err(e) = handle.join() {
                warn!("Failed to join drain thread: {:?}", e);
            }
        }

        if let Some(handle) = self.callback_handle.take() {
            std::thread::sleep(std::time::Duration::from_millis(100));
            if !handle.is_finished() {
                warn!("Callback thread didn't exit in time");
            }
            if let Err(e) = handle.join() {
                warn!("Failed to join callback thread: {:?}", e);
            }
        }

        info!("Audio capture stopped");
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.shutdown();
    }
}
