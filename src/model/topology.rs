use std::path::{Component, Path};

use serde::Deserialize;

use crate::error::RecognitionError;

/// Contents of a layers-format `model.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelJson {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub converted_by: Option<String>,
    pub model_topology: Topology,
    pub weights_manifest: Vec<WeightsGroup>,
}

/// Some converters wrap the model config in a `model_config` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Topology {
    Wrapped { model_config: ModelConfig },
    Bare(ModelConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub class_name: String,
    pub config: SequentialConfig,
}

/// Older Keras versions store the layer list directly as the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SequentialConfig {
    Named {
        #[serde(default)]
        name: Option<String>,
        layers: Vec<LayerJson>,
    },
    List(Vec<LayerJson>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerJson {
    pub class_name: String,
    pub config: LayerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "batch_shape")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
    #[serde(default)]
    pub units: Option<usize>,
    #[serde(default)]
    pub activation: Option<String>,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
}

fn default_use_bias() -> bool {
    true
}

/// One group of weights stored across one or more binary shards.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightsGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default)]
    pub quantization: Option<serde_json::Value>,
}

impl WeightSpec {
    /// `None` when the shape's product does not fit in `usize`.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }

    /// Size of the float32 data for this weight.
    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(std::mem::size_of::<f32>())
    }

    /// Name without the `:0` output suffix some exporters append.
    pub fn canonical_name(&self) -> &str {
        self.name.strip_suffix(":0").unwrap_or(&self.name)
    }
}

impl ModelJson {
    pub fn parse(bytes: &[u8]) -> Result<Self, RecognitionError> {
        let model: ModelJson = serde_json::from_slice(bytes)?;
        for path in model.shard_paths() {
            validate_shard_path(path)?;
        }
        for spec in model.weights_manifest.iter().flat_map(|g| g.weights.iter()) {
            if spec.byte_len().is_none() {
                return Err(RecognitionError::ModelLoad(format!(
                    "weight {} has an oversized shape {:?}",
                    spec.name, spec.shape
                )));
            }
        }
        Ok(model)
    }

    pub fn model_config(&self) -> &ModelConfig {
        match &self.model_topology {
            Topology::Wrapped { model_config } => model_config,
            Topology::Bare(config) => config,
        }
    }

    pub fn layers(&self) -> &[LayerJson] {
        match &self.model_config().config {
            SequentialConfig::Named { layers, .. } => layers,
            SequentialConfig::List(layers) => layers,
        }
    }

    /// Every shard path in manifest order.
    pub fn shard_paths(&self) -> impl Iterator<Item = &str> {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.paths.iter().map(String::as_str))
    }

    /// Bytes the weight shards should add up to, assuming float32 storage.
    pub fn expected_weight_bytes(&self) -> u64 {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.weights.iter())
            .map(|w| w.byte_len().map_or(u64::MAX, |n| n as u64))
            .fold(0u64, u64::saturating_add)
    }
}

/// Shard paths come from a downloaded file and end up joined onto the cache
/// directory, so they must stay relative and inside it.
fn validate_shard_path(path: &str) -> Result<(), RecognitionError> {
    let ok = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(RecognitionError::ModelLoad(format!(
            "weight shard path {path:?} must be relative and stay within the model directory"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"{
        "format": "layers-model",
        "generatedBy": "keras v2.4.0",
        "convertedBy": "TensorFlow.js Converter v2.7.0",
        "modelTopology": {
            "class_name": "Sequential",
            "config": {
                "name": "sequential",
                "layers": [
                    {"class_name": "Flatten", "config": {"name": "flatten", "batch_input_shape": [null, 28, 28]}},
                    {"class_name": "Dense", "config": {"name": "dense", "units": 10, "activation": "softmax"}}
                ]
            },
            "keras_version": "2.4.0",
            "backend": "tensorflow"
        },
        "weightsManifest": [
            {"paths": ["group1-shard1of1.bin"], "weights": [
                {"name": "dense/kernel", "shape": [784, 10], "dtype": "float32"},
                {"name": "dense/bias", "shape": [10], "dtype": "float32"}
            ]}
        ]
    }"#;

    #[test]
    fn parses_bare_topology() {
        let model = ModelJson::parse(BARE.as_bytes()).unwrap();
        assert_eq!(model.model_config().class_name, "Sequential");
        assert_eq!(model.layers().len(), 2);
        assert_eq!(
            model.layers()[0].config.batch_input_shape,
            Some(vec![None, Some(28), Some(28)])
        );
        assert!(model.layers()[1].config.use_bias);
        assert_eq!(model.shard_paths().collect::<Vec<_>>(), vec!["group1-shard1of1.bin"]);
        assert_eq!(model.expected_weight_bytes(), (784 * 10 + 10) * 4);
    }

    #[test]
    fn parses_wrapped_topology_with_layer_list() {
        let json = r#"{
            "modelTopology": {
                "model_config": {
                    "class_name": "Sequential",
                    "config": [
                        {"class_name": "Dense", "config": {"name": "d", "units": 2, "batch_shape": [null, 4, 4], "use_bias": false}}
                    ]
                }
            },
            "weightsManifest": []
        }"#;
        let model = ModelJson::parse(json.as_bytes()).unwrap();
        assert_eq!(model.layers().len(), 1);
        assert!(!model.layers()[0].config.use_bias);
        assert_eq!(
            model.layers()[0].config.batch_input_shape,
            Some(vec![None, Some(4), Some(4)])
        );
    }

    #[test]
    fn rejects_escaping_shard_paths() {
        for path in ["../evil.bin", "/etc/passwd", "a/../../b.bin", ""] {
            let json = BARE.replace("group1-shard1of1.bin", path);
            let err = ModelJson::parse(json.as_bytes()).unwrap_err();
            assert!(matches!(err, RecognitionError::ModelLoad(_)), "{path}");
        }
    }

    #[test]
    fn canonical_name_strips_output_suffix() {
        let spec = WeightSpec {
            name: "dense/kernel:0".into(),
            shape: vec![2, 3],
            dtype: "float32".into(),
            quantization: None,
        };
        assert_eq!(spec.canonical_name(), "dense/kernel");
        assert_eq!(spec.element_count(), Some(6));
        assert_eq!(spec.byte_len(), Some(24));
    }

    #[test]
    fn rejects_shapes_that_overflow() {
        let json = BARE.replace("[784, 10]", "[4294967296, 4294967296, 16]");
        let err = ModelJson::parse(json.as_bytes()).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelLoad(_)));
        assert!(err.to_string().contains("dense/kernel"));
    }
}
