//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Cpu => write!(f, "cpu"),
            Provider::Cuda => write!(f, "cuda"),
            Provider::CoreMl => write!(f, "coreml"),
        }
    }
}

impl Provider {
    /// Convert to sherpa-rs provider string.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// How a hypothesis is compared against the trigger phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive comparison ignoring punctuation and extra whitespace
    #[default]
    Normalized,
    /// Byte-for-byte equality with the trigger phrase
    Exact,
}

/// Voice trigger application configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-trigger")]
#[command(author, version, about = "Listens for a spoken trigger phrase and exits when it is heard", long_about = None)]
pub struct AppConfig {
    /// The phrase to listen for
    #[arg(value_name = "PHRASE")]
    pub trigger: String,

    /// Directory containing model files (Whisper, VAD)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Name of the audio input device (default input device if omitted)
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// WAV file to transcribe instead of listening on the microphone
    #[arg(long, value_name = "FILE")]
    pub infile: Option<PathBuf>,

    /// Print utterance start/end times in file mode
    #[arg(long)]
    pub time: bool,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Voice activity detection threshold (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// Silence duration in seconds that ends an utterance
    #[arg(long, default_value = "1.0")]
    pub vad_silence_duration: f32,

    /// Trigger phrase match mode
    #[arg(long, value_enum, default_value = "normalized")]
    pub match_mode: MatchMode,

    /// STT language code (e.g., en, es, fr, de, it, pt, zh, ja, ko, ru)
    /// Use "auto" for automatic language detection
    #[arg(long, default_value = "en")]
    pub stt_language: String,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Number of threads for all models (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// VAD threads (0 = use num_threads, typically 1)
    #[arg(long, default_value = "0")]
    pub vad_threads: usize,

    /// STT threads (0 = use num_threads, typically cores/3)
    #[arg(long, default_value = "0")]
    pub stt_threads: usize,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Auto-detect and normalize thread counts based on CPU cores and provider.
    ///
    /// When using CUDA, fewer threads (typically 1) should be used because the
    /// GPU handles parallelism internally. Multiple CPU threads with GPU
    /// inference can cause resource contention and CUDA allocation failures.
    fn normalize_thread_counts(&mut self) {
        let cpu_cores = num_cpus::get();
        let using_cuda = self.effective_provider() == Provider::Cuda;

        if self.num_threads == 0 {
            if using_cuda {
                self.num_threads = 1;
            } else {
                // cores/3 leaves headroom and prevents oversubscription
                self.num_threads = (cpu_cores / 3).max(1);
            }
        }

        // VAD is lightweight, one thread is enough
        if self.vad_threads == 0 {
            self.vad_threads = 1;
        }

        // Whisper is CPU-intensive on CPU, but use 1 for CUDA
        if self.stt_threads == 0 {
            self.stt_threads = if using_cuda { 1 } else { self.num_threads };
        }

        if self.verbose {
            info!(
                "CPU cores: {}, Provider: {}, Thread counts: VAD={}, STT={}",
                cpu_cores,
                self.effective_provider(),
                self.vad_threads,
                self.stt_threads
            );
        }
    }

    /// Get the effective acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Get the path to the Whisper encoder model.
    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    /// Get the path to the Whisper decoder model.
    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    /// Get the path to the Whisper tokens file.
    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    /// Get the path to the VAD model.
    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    /// Get the effective STT language code for Whisper.
    /// Returns empty string for auto-detection, otherwise the language code.
    pub fn effective_stt_language(&self) -> &str {
        if self.stt_language.eq_ignore_ascii_case("auto") {
            "" // Empty string triggers auto-detection in Whisper
        } else {
            &self.stt_language
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.trigger.trim().is_empty() {
            anyhow::bail!("Trigger phrase must not be empty");
        }

        if !self.model_dir.exists() {
            anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
        }

        let required_files = [
            self.whisper_encoder_path(),
            self.whisper_decoder_path(),
            self.whisper_tokens_path(),
            self.vad_model_path(),
        ];

        for path in &required_files {
            if !path.exists() {
                anyhow::bail!("Required model file not found: {}", path.display());
            }
        }

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }

        if self.vad_silence_duration <= 0.0 {
            anyhow::bail!("VAD silence duration must be positive");
        }

        if let Some(ref infile) = self.infile
            && !infile.exists()
        {
            anyhow::bail!("Input file not found: {}", infile.display());
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Trigger phrase: \"{}\"", self.trigger);
        info!("  Match mode: {:?}", self.match_mode);
        info!("  Model directory: {}", self.model_dir.display());
        if let Some(ref device) = self.device {
            info!("  Input device: {}", device);
        }
        if let Some(ref infile) = self.infile {
            info!("  Input file: {}", infile.display());
        }
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  VAD threshold: {}", self.vad_threshold);
        info!("  VAD silence duration: {}s", self.vad_silence_duration);
        info!("  STT language: {}", self.stt_language);
        info!("  Provider: {}", self.effective_provider());
    }
}

/// Get the default model directory (~/.voice-trigger/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".voice-trigger").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
    ];

    for path in &nvidia_paths {
        if Path::new(path).exists() {
            return true;
        }
    }

    Path::new("/etc/nv_tegra_release").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn base_config() -> AppConfig {
        AppConfig::parse_from(["voice-trigger", "stop listening"])
    }

    #[test]
    fn test_missing_model_dir_rejected() {
        let mut config = base_config();
        config.model_dir = PathBuf::from("/nonexistent/model/dir");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Model directory does not exist"));
    }

    #[test]
    fn test_empty_trigger_rejected() {
        let mut config = base_config();
        config.trigger = "   ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Trigger phrase"));
    }

    /// Create empty stand-ins for the model files so validate() gets past
    /// the existence checks and reaches the numeric ranges.
    fn touch_model_files(config: &AppConfig) {
        std::fs::create_dir_all(config.model_dir.join("whisper")).unwrap();
        let paths = [
            config.whisper_encoder_path(),
            config.whisper_decoder_path(),
            config.whisper_tokens_path(),
            config.vad_model_path(),
        ];
        for path in &paths {
            std::fs::File::create(path).unwrap();
        }
    }

    #[test]
    fn test_missing_model_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config();
        config.model_dir = dir.path().to_path_buf();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model file not found"));
    }

    #[test]
    fn test_vad_threshold_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config();
        config.model_dir = dir.path().to_path_buf();
        touch_model_files(&config);

        config.vad_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VAD threshold must be between 0.0 and 1.0"));

        config.vad_threshold = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VAD threshold must be between 0.0 and 1.0"));

        config.vad_threshold = 0.5;
        config.validate().unwrap();
    }

    #[test]
    fn test_nonpositive_silence_duration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config();
        config.model_dir = dir.path().to_path_buf();
        touch_model_files(&config);

        config.vad_silence_duration = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VAD silence duration must be positive"));

        config.vad_silence_duration = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VAD silence duration must be positive"));
    }

    #[test]
    fn test_device_flag_parses() {
        let config = AppConfig::parse_from(["voice-trigger", "stop listening", "--device", "USB Microphone"]);
        assert_eq!(config.device.as_deref(), Some("USB Microphone"));
        assert_eq!(base_config().device, None);
    }

    #[test]
    fn test_auto_language_maps_to_empty() {
        let mut config = base_config();
        config.stt_language = "auto".to_string();
        assert_eq!(config.effective_stt_language(), "");
        config.stt_language = "en".to_string();
        assert_eq!(config.effective_stt_language(), "en");
    }

    #[test]
    fn test_thread_normalization_fills_zeroes() {
        let mut config = base_config();
        config.provider = Some(Provider::Cpu);
        config.normalize_thread_counts();
        assert!(config.num_threads >= 1);
        assert_eq!(config.vad_threads, 1);
        assert!(config.stt_threads >= 1);
    }
}
