use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::kind::DataKind;
use crate::error::{Error, Result};

/// The three declarable layer families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Dense,
    Convolution,
    #[serde(rename = "Max pooling", alias = "Pooling")]
    Pooling,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LayerKind::Dense => "Dense",
            LayerKind::Convolution => "Convolution",
            LayerKind::Pooling => "Max pooling",
        })
    }
}

/// One declared layer.
///
/// `size` carries one to three extents and doubles as the layer's spatial
/// rank: unit count for dense, kernel extents for convolution, window
/// extents for pooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: Vec<usize>,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<LayerParams>,
}

impl LayerSpec {
    pub fn spatial_rank(&self) -> usize {
        self.size.len()
    }
}

/// Extra knobs a layer may declare. Only convolution reads them today;
/// unset stride and padding fall back to 1 and 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<usize>,
}

/// Input or output declaration of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoSpec {
    #[serde(rename = "type")]
    pub kind: DataKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

fn default_epochs() -> usize {
    10
}

/// A project as stored on disk. Freshly created projects only carry a name,
/// a default architecture and an epoch count; input, output and data path
/// arrive later through the configuration API, so they stay optional here
/// and are only enforced when training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub hidden_layers: Vec<LayerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<IoSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data_path: Option<PathBuf>,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

impl ProjectConfig {
    /// The configuration a new project starts from: one dense layer of 100
    /// units and ten epochs.
    pub fn default_for(name: &str) -> ProjectConfig {
        ProjectConfig {
            name: name.to_string(),
            hidden_layers: vec![LayerSpec {
                size: vec![100],
                kind: LayerKind::Dense,
                config: None,
            }],
            input: None,
            output: None,
            training_data_path: None,
            epochs: default_epochs(),
        }
    }

    /// Structural checks that hold for any stored project, trained or not.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("project name is empty".to_string()));
        }
        if self.epochs == 0 {
            return Err(Error::Configuration(
                "epochs must be at least 1".to_string(),
            ));
        }
        if self.hidden_layers.is_empty() {
            return Err(Error::Configuration(
                "hidden_layers must declare at least one layer".to_string(),
            ));
        }
        for (position, layer) in self.hidden_layers.iter().enumerate() {
            let ordinal = position + 1;
            if layer.size.is_empty() || layer.size.len() > 3 {
                return Err(Error::Configuration(format!(
                    "layer {}: size must carry 1 to 3 extents, got {}",
                    ordinal,
                    layer.size.len()
                )));
            }
            if layer.size.iter().any(|&e| e == 0) {
                return Err(Error::Configuration(format!(
                    "layer {}: size extents must be positive",
                    ordinal
                )));
            }
            if layer.kind == LayerKind::Dense && layer.size.len() != 1 {
                return Err(Error::Configuration(format!(
                    "layer {} (Dense): size must carry exactly one extent",
                    ordinal
                )));
            }
            if let Some(params) = &layer.config {
                if params.stride == Some(0) {
                    return Err(Error::Configuration(format!(
                        "layer {}: stride must be at least 1",
                        ordinal
                    )));
                }
            }
        }
        Ok(())
    }

    /// Everything training additionally needs: declared input and output
    /// kinds and a label-index path.
    pub fn validate_for_training(&self) -> Result<(&IoSpec, &IoSpec, &Path)> {
        self.validate()?;
        let input = self.input.as_ref().ok_or_else(|| {
            Error::Configuration(format!("project '{}' has no input type set", self.name))
        })?;
        let output = self.output.as_ref().ok_or_else(|| {
            Error::Configuration(format!("project '{}' has no output type set", self.name))
        })?;
        let data_path = self.training_data_path.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "project '{}' has no training data path set",
                self.name
            ))
        })?;
        Ok((input, output, data_path))
    }

    /// Serializes the configuration to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a configuration from a JSON file.
    pub fn load_json(path: &Path) -> Result<ProjectConfig> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_project_has_one_dense_layer() {
        let cfg = ProjectConfig::default_for("demo");
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.hidden_layers.len(), 1);
        assert_eq!(cfg.hidden_layers[0].size, vec![100]);
        assert_eq!(cfg.hidden_layers[0].kind, LayerKind::Dense);
        cfg.validate().unwrap();
        assert!(cfg.validate_for_training().is_err());
    }

    #[test]
    fn stored_wire_format_round_trips() {
        let json = r#"{
            "name": "digits",
            "hidden_layers": [
                {"size": [3, 3], "type": "Convolution",
                 "config": {"filters": 8, "activation": "ReLU"}},
                {"size": [2, 2], "type": "Max pooling"},
                {"size": [64], "type": "Dense"}
            ],
            "input": {"type": "Black and White Image"},
            "output": {"type": "Identification"},
            "training_data_path": "/data/labels.json",
            "epochs": 5
        }"#;
        let cfg: ProjectConfig = serde_json::from_str(json).unwrap();
        cfg.validate().unwrap();
        let (input, output, path) = cfg.validate_for_training().unwrap();
        assert_eq!(input.kind, DataKind::GrayscaleImage);
        assert_eq!(output.kind, DataKind::Categorical);
        assert_eq!(path, Path::new("/data/labels.json"));

        let back: ProjectConfig =
            serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn missing_epochs_defaults_to_ten() {
        let json = r#"{"name": "p", "hidden_layers": [{"size": [4], "type": "Dense"}]}"#;
        let cfg: ProjectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.epochs, 10);
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let mut cfg = ProjectConfig::default_for("p");
        cfg.hidden_layers[0].size = vec![2, 2];
        assert!(cfg.validate().is_err()); // dense wants one extent

        let mut cfg = ProjectConfig::default_for("p");
        cfg.hidden_layers[0].size = vec![1, 1, 1, 1];
        assert!(cfg.validate().is_err());

        let mut cfg = ProjectConfig::default_for("p");
        cfg.hidden_layers[0].size = vec![0];
        assert!(cfg.validate().is_err());

        let mut cfg = ProjectConfig::default_for("p");
        cfg.epochs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ProjectConfig::default_for("p");
        cfg.hidden_layers.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "trellis-config-{}-roundtrip.json",
            std::process::id()
        ));
        let cfg = ProjectConfig::default_for("roundtrip");
        cfg.save_json(&path).unwrap();
        let back = ProjectConfig::load_json(&path).unwrap();
        assert_eq!(back, cfg);
        std::fs::remove_file(&path).ok();
    }
}
