//! Model and label assets, loaded once at startup

use std::path::Path;
use std::sync::Arc;

use inference_engine::{InterpreterFactory, LabelTable};
use tracing::{error, info};

use crate::config::ClassifierConfig;
use crate::PipelineError;

/// Model bytes and the label table that names its outputs
#[derive(Debug, Clone)]
pub struct ModelAssets {
    model: Arc<[u8]>,
    labels: LabelTable,
}

impl ModelAssets {
    /// Pair a model with its labels, checking the label count against the
    /// model's output width
    pub fn new(
        model: impl Into<Arc<[u8]>>,
        labels: LabelTable,
        factory: &dyn InterpreterFactory,
    ) -> Result<Self, PipelineError> {
        let model = model.into();
        let outputs = factory.output_width(&model)?;
        labels.ensure_width(outputs).map_err(|e| {
            error!("{}", e);
            PipelineError::Config(e.to_string())
        })?;
        Ok(Self { model, labels })
    }

    /// Read the files named by `config`
    pub fn load(config: &ClassifierConfig, factory: &dyn InterpreterFactory) -> Result<Self, PipelineError> {
        let model = read(&config.model_path)?;
        let labels = LabelTable::load(&config.labels_path)?;
        info!(
            "Loaded model {} ({} bytes), {} labels",
            config.model_path.display(),
            model.len(),
            labels.len()
        );
        Self::new(model, labels, factory)
    }

    pub fn model(&self) -> &Arc<[u8]> {
        &self.model
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }
}

fn read(path: &Path) -> Result<Vec<u8>, PipelineError> {
    std::fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::fake::FakeInterpreterFactory;

    #[test]
    fn test_matching_widths() {
        let factory = FakeInterpreterFactory::new(vec![0.0; 3]);
        let labels: LabelTable = ["a", "b", "c"].into_iter().collect();
        let assets = ModelAssets::new(vec![1u8, 2, 3], labels, &factory).unwrap();
        assert_eq!(assets.labels().len(), 3);
        assert_eq!(assets.model().len(), 3);
    }

    #[test]
    fn test_width_mismatch_is_config_error() {
        let factory = FakeInterpreterFactory::new(vec![0.0; 1001]);
        let labels: LabelTable = ["a", "b"].into_iter().collect();
        let err = ModelAssets::new(vec![0u8], labels, &factory).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_model_file() {
        let config = ClassifierConfig {
            model_path: "/nonexistent/model.onnx".into(),
            ..Default::default()
        };
        let factory = FakeInterpreterFactory::new(vec![0.0; 2]);
        let err = ModelAssets::load(&config, &factory).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
