//! Classifier configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use frame_convert::{ConverterConfig, ScaleFilter};
use inference_engine::{EngineConfig, DEFAULT_TOP_K, IMAGE_MEAN, IMAGE_STD};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PipelineError;

/// Environment variable prefix, e.g. `CLASSIFIER__TOP_K=5`
pub const ENV_PREFIX: &str = "CLASSIFIER";

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Model weights (ONNX)
    pub model_path: PathBuf,

    /// Newline-delimited label file, one label per model output
    pub labels_path: PathBuf,

    /// Attach a hardware delegate on init
    pub use_accel: bool,

    /// Labels reported per frame
    pub top_k: usize,

    /// Square model input edge
    pub input_size: u32,

    /// Normalization mean
    pub image_mean: f32,

    /// Normalization divisor
    pub image_std: f32,

    /// Resampling filter for the crop-and-scale step
    pub scale_filter: ScaleFilter,

    /// Producer-side sleep after each `analyze` call (milliseconds)
    pub analyze_throttle_ms: u64,

    /// tracing level: trace, debug, info, warn, error
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/mobilenet_v1_1.0_224.onnx"),
            labels_path: PathBuf::from("models/labels.txt"),
            use_accel: false,
            top_k: DEFAULT_TOP_K,
            input_size: 224,
            image_mean: IMAGE_MEAN,
            image_std: IMAGE_STD,
            scale_filter: ScaleFilter::Nearest,
            analyze_throttle_ms: 300,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ClassifierConfig {
    /// Load from an optional file, then apply `CLASSIFIER__*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.top_k == 0 {
            return Err(PipelineError::Config("top_k must be at least 1".into()));
        }
        if self.input_size == 0 {
            return Err(PipelineError::Config("input_size must be non-zero".into()));
        }
        if self.image_std == 0.0 || !self.image_std.is_finite() {
            return Err(PipelineError::Config(format!("invalid image_std {}", self.image_std)));
        }
        if !self.image_mean.is_finite() {
            return Err(PipelineError::Config(format!("invalid image_mean {}", self.image_mean)));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            input_size: self.input_size,
            mean: self.image_mean,
            std: self.image_std,
        }
    }

    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            target_size: self.input_size,
            filter: self.scale_filter,
        }
    }

    pub fn analyze_throttle(&self) -> Duration {
        Duration::from_millis(self.analyze_throttle_ms)
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(e: config::ConfigError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClassifierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 4);
        assert_eq!(config.analyze_throttle(), Duration::from_millis(300));
        assert_eq!(config.converter_config(), ConverterConfig::default());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let config = ClassifierConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_std() {
        let config = ClassifierConfig {
            image_std: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("classifier-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "top_k = 5").unwrap();
        writeln!(file, "scale_filter = \"triangle\"").unwrap();
        writeln!(file, "labels_path = \"assets/labels.txt\"").unwrap();
        drop(file);

        let config = ClassifierConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.top_k, 5);
        assert_eq!(config.scale_filter, ScaleFilter::Triangle);
        assert_eq!(config.labels_path, PathBuf::from("assets/labels.txt"));
        // Untouched fields keep defaults
        assert_eq!(config.input_size, 224);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ClassifierConfig::load(Some(Path::new("/nonexistent/classifier.toml"))).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
