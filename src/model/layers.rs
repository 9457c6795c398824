use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayD, ArrayView3, Axis, Ix1, Ix2, IxDyn};

use super::topology::{LayerJson, ModelJson, SequentialConfig};
use super::{InputShape, Model};
use crate::error::RecognitionError;

/// Element-wise (or row-wise, for softmax) activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    pub fn parse(name: Option<&str>) -> Result<Self, RecognitionError> {
        match name.unwrap_or("linear") {
            "linear" => Ok(Activation::Linear),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            other => Err(RecognitionError::ModelLoad(format!(
                "unsupported activation {other:?}"
            ))),
        }
    }

    fn apply(self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            Activation::Linear => x,
            Activation::Relu => {
                x.mapv_inplace(|v| v.max(0.0));
                x
            }
            Activation::Sigmoid => {
                x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
                x
            }
            Activation::Tanh => {
                x.mapv_inplace(f32::tanh);
                x
            }
            Activation::Softmax => {
                let last = Axis(x.ndim().saturating_sub(1));
                for mut lane in x.lanes_mut(last) {
                    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - max).exp());
                    let sum = lane.sum();
                    if sum > 0.0 {
                        lane.mapv_inplace(|v| v / sum);
                    }
                }
                x
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Flatten,
    Dense {
        kernel: Array2<f32>,
        bias: Option<Array1<f32>>,
        activation: Activation,
    },
    Activation(Activation),
}

impl Layer {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>, RecognitionError> {
        match self {
            Layer::Flatten => {
                let batch = x.shape().first().copied().unwrap_or(1);
                let features = x.len() / batch.max(1);
                let x = if x.is_standard_layout() {
                    x
                } else {
                    x.as_standard_layout().into_owned()
                };
                x.into_shape_with_order(IxDyn(&[batch, features]))
                    .map_err(|e| RecognitionError::Inference(format!("flatten: {e}")))
            }
            Layer::Dense {
                kernel,
                bias,
                activation,
            } => {
                let x = x.into_dimensionality::<Ix2>().map_err(|_| {
                    RecognitionError::Inference(
                        "dense layer expects a flattened [batch, features] input".into(),
                    )
                })?;
                if x.ncols() != kernel.nrows() {
                    return Err(RecognitionError::Inference(format!(
                        "dense layer expects {} features, got {}",
                        kernel.nrows(),
                        x.ncols()
                    )));
                }
                let mut y = x.dot(kernel);
                if let Some(bias) = bias {
                    y += bias;
                }
                Ok(activation.apply(y.into_dyn()))
            }
            Layer::Activation(activation) => Ok(activation.apply(x)),
        }
    }
}

/// A sequential dense network loaded from a layers-format `model.json` and
/// its weight shards.
#[derive(Debug, Clone)]
pub struct LayersModel {
    name: Option<String>,
    batch_input_shape: Vec<usize>,
    layers: Vec<Layer>,
}

impl LayersModel {
    /// Build the model from its parsed manifest and the concatenated shard
    /// bytes of each weights group, in manifest order.
    pub fn from_artifacts(
        manifest: &ModelJson,
        group_data: &[Vec<u8>],
    ) -> Result<Self, RecognitionError> {
        let config = manifest.model_config();
        if config.class_name != "Sequential" {
            return Err(RecognitionError::ModelLoad(format!(
                "unsupported model class {:?}, only Sequential models can be loaded",
                config.class_name
            )));
        }

        let batch_input_shape = input_dims(manifest.layers())?;
        let mut weights = decode_weights(manifest, group_data)?;

        let mut layers = Vec::new();
        for layer in manifest.layers() {
            match layer.class_name.as_str() {
                "InputLayer" | "Dropout" => {}
                "Flatten" => layers.push(Layer::Flatten),
                "Activation" => layers.push(Layer::Activation(Activation::parse(
                    layer.config.activation.as_deref(),
                )?)),
                "Dense" => layers.push(build_dense(layer, &mut weights)?),
                other => {
                    return Err(RecognitionError::ModelLoad(format!(
                        "unsupported layer type {other:?}"
                    )))
                }
            }
        }

        log::debug!(
            "Built {} layers, input shape {:?}",
            layers.len(),
            batch_input_shape
        );

        Ok(Self {
            name: match &config.config {
                SequentialConfig::Named { name, .. } => name.clone(),
                SequentialConfig::List(_) => None,
            },
            batch_input_shape,
            layers,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Model for LayersModel {
    fn input_shape(&self) -> InputShape {
        InputShape {
            height: self.batch_input_shape[0],
            width: self.batch_input_shape[1],
        }
    }

    fn predict(&self, input: ArrayView3<'_, f32>) -> Result<Array2<f32>, RecognitionError> {
        let shape = self.input_shape();
        let (batch, height, width) = input.dim();
        if (height, width) != (shape.height, shape.width) {
            return Err(RecognitionError::Inference(format!(
                "model expects {}x{} input, got {height}x{width}",
                shape.height, shape.width
            )));
        }

        // A trailing channel axis of size 1 is allowed in the declared shape.
        let mut dims = vec![batch];
        dims.extend_from_slice(&self.batch_input_shape);
        let mut x = input
            .as_standard_layout()
            .into_owned()
            .into_dyn()
            .into_shape_with_order(IxDyn(&dims))
            .map_err(|e| RecognitionError::Inference(format!("input reshape: {e}")))?;

        for layer in &self.layers {
            x = layer.forward(x)?;
        }

        x.into_dimensionality::<Ix2>().map_err(|_| {
            RecognitionError::Inference("model output is not a [batch, classes] tensor".into())
        })
    }
}

/// Declared input dims without the batch axis, e.g. `[28, 28]`.
fn input_dims(layers: &[LayerJson]) -> Result<Vec<usize>, RecognitionError> {
    let shape = layers
        .iter()
        .find_map(|l| l.config.batch_input_shape.as_ref())
        .ok_or_else(|| RecognitionError::ModelLoad("model declares no input shape".into()))?;

    let dims = shape
        .iter()
        .skip(1)
        .map(|d| {
            d.ok_or_else(|| {
                RecognitionError::ModelLoad("input shape has unknown dimensions".into())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let spatial_ok = dims.len() >= 2 && dims[2..].iter().all(|&d| d == 1);
    if !spatial_ok {
        return Err(RecognitionError::ModelLoad(format!(
            "expected an image input shape [null, height, width], got {shape:?}"
        )));
    }
    Ok(dims)
}

fn decode_weights(
    manifest: &ModelJson,
    group_data: &[Vec<u8>],
) -> Result<HashMap<String, ArrayD<f32>>, RecognitionError> {
    if group_data.len() != manifest.weights_manifest.len() {
        return Err(RecognitionError::ModelLoad(format!(
            "manifest lists {} weight groups, got data for {}",
            manifest.weights_manifest.len(),
            group_data.len()
        )));
    }

    let mut weights = HashMap::new();
    for (group, data) in manifest.weights_manifest.iter().zip(group_data) {
        let mut offset = 0usize;
        for spec in &group.weights {
            if spec.dtype != "float32" {
                return Err(RecognitionError::ModelLoad(format!(
                    "weight {} has unsupported dtype {}",
                    spec.name, spec.dtype
                )));
            }
            if spec.quantization.is_some() {
                return Err(RecognitionError::ModelLoad(format!(
                    "weight {} is quantized, which is not supported",
                    spec.name
                )));
            }

            let end = spec
                .byte_len()
                .and_then(|len| offset.checked_add(len))
                .ok_or_else(|| {
                    RecognitionError::ModelLoad(format!(
                        "weight {} has an oversized shape {:?}",
                        spec.name, spec.shape
                    ))
                })?;
            let bytes = data.get(offset..end).ok_or_else(|| {
                RecognitionError::ModelLoad(format!(
                    "weight data ends before {} ({} bytes available, {end} needed)",
                    spec.name,
                    data.len()
                ))
            })?;
            offset = end;

            let values: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let tensor = ArrayD::from_shape_vec(IxDyn(&spec.shape), values)
                .map_err(|e| RecognitionError::ModelLoad(format!("{}: {e}", spec.name)))?;
            weights.insert(spec.canonical_name().to_string(), tensor);
        }
    }
    Ok(weights)
}

/// Weights are named `<layer>/kernel`, possibly under an outer scope such as
/// `sequential/<layer>/kernel`.
fn take_weight(
    weights: &mut HashMap<String, ArrayD<f32>>,
    layer: &str,
    kind: &str,
) -> Option<ArrayD<f32>> {
    let exact = format!("{layer}/{kind}");
    if let Some(w) = weights.remove(&exact) {
        return Some(w);
    }
    let scoped = format!("/{exact}");
    let key = weights.keys().find(|k| k.ends_with(&scoped))?.clone();
    weights.remove(&key)
}

fn build_dense(
    layer: &LayerJson,
    weights: &mut HashMap<String, ArrayD<f32>>,
) -> Result<Layer, RecognitionError> {
    let name = layer
        .config
        .name
        .as_deref()
        .ok_or_else(|| RecognitionError::ModelLoad("dense layer without a name".into()))?;
    let missing = |kind: &str| RecognitionError::ModelLoad(format!("missing weight {name}/{kind}"));

    let kernel = take_weight(weights, name, "kernel")
        .ok_or_else(|| missing("kernel"))?
        .into_dimensionality::<Ix2>()
        .map_err(|_| RecognitionError::ModelLoad(format!("{name}/kernel must be 2-D")))?;

    if let Some(units) = layer.config.units {
        if kernel.ncols() != units {
            return Err(RecognitionError::ModelLoad(format!(
                "{name}/kernel has {} columns but the layer declares {units} units",
                kernel.ncols()
            )));
        }
    }

    let bias = if layer.config.use_bias {
        let bias = take_weight(weights, name, "bias")
            .ok_or_else(|| missing("bias"))?
            .into_dimensionality::<Ix1>()
            .map_err(|_| RecognitionError::ModelLoad(format!("{name}/bias must be 1-D")))?;
        if bias.len() != kernel.ncols() {
            return Err(RecognitionError::ModelLoad(format!(
                "{name}/bias has {} entries, expected {}",
                bias.len(),
                kernel.ncols()
            )));
        }
        Some(bias)
    } else {
        None
    };

    Ok(Layer::Dense {
        kernel,
        bias,
        activation: Activation::parse(layer.config.activation.as_deref())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// 2x2 input, one dense layer with 3 units.
    fn manifest(activation: &str, dtype: &str) -> ModelJson {
        let json = format!(
            r#"{{
                "modelTopology": {{
                    "class_name": "Sequential",
                    "config": {{
                        "name": "tiny",
                        "layers": [
                            {{"class_name": "Flatten", "config": {{"name": "flatten", "batch_input_shape": [null, 2, 2]}}}},
                            {{"class_name": "Dropout", "config": {{"name": "dropout"}}}},
                            {{"class_name": "Dense", "config": {{"name": "out", "units": 3, "activation": "{activation}"}}}}
                        ]
                    }}
                }},
                "weightsManifest": [{{
                    "paths": ["group1-shard1of1.bin"],
                    "weights": [
                        {{"name": "sequential/out/kernel:0", "shape": [4, 3], "dtype": "{dtype}"}},
                        {{"name": "sequential/out/bias:0", "shape": [3], "dtype": "{dtype}"}}
                    ]
                }}]
            }}"#
        );
        ModelJson::parse(json.as_bytes()).unwrap()
    }

    fn weights() -> Vec<u8> {
        // Column j of the kernel picks input pixel j; bias adds 0.5 to unit 2.
        let kernel = [
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0,
        ];
        let bias = [0.0, 0.0, 0.5];
        let mut bytes = f32_bytes(&kernel);
        bytes.extend(f32_bytes(&bias));
        bytes
    }

    #[test]
    fn evaluates_linear_dense_layer() {
        let model = LayersModel::from_artifacts(&manifest("linear", "float32"), &[weights()]).unwrap();
        assert_eq!(model.name(), Some("tiny"));
        assert_eq!(model.input_shape(), InputShape { height: 2, width: 2 });

        let input = Array3::from_shape_vec((1, 2, 2), vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let out = model.predict(input.view()).unwrap();
        let expected = array![[0.1f32, 0.2, 0.8]];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_output_sums_to_one() {
        let model = LayersModel::from_artifacts(&manifest("softmax", "float32"), &[weights()]).unwrap();
        let input = Array3::from_shape_vec((2, 2, 2), vec![1.0; 8]).unwrap();
        let out = model.predict(input.view()).unwrap();
        assert_eq!(out.dim(), (2, 3));
        for row in out.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
            assert!(row[2] > row[0]);
        }
    }

    #[test]
    fn rejects_wrong_input_size() {
        let model = LayersModel::from_artifacts(&manifest("relu", "float32"), &[weights()]).unwrap();
        let input = Array3::<f32>::zeros((1, 3, 3));
        assert!(matches!(
            model.predict(input.view()),
            Err(RecognitionError::Inference(_))
        ));
    }

    #[test]
    fn rejects_unsupported_dtype_and_short_data() {
        let err = LayersModel::from_artifacts(&manifest("relu", "int32"), &[weights()]).unwrap_err();
        assert!(err.to_string().contains("dtype"));

        let short = weights()[..20].to_vec();
        let err = LayersModel::from_artifacts(&manifest("relu", "float32"), &[short]).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelLoad(_)));
    }

    #[test]
    fn rejects_unknown_activation_and_missing_groups() {
        assert!(LayersModel::from_artifacts(&manifest("gelu", "float32"), &[weights()]).is_err());
        assert!(LayersModel::from_artifacts(&manifest("relu", "float32"), &[]).is_err());
    }

    #[test]
    fn rejects_dense_layer_without_its_kernel() {
        let json = r#"{
            "modelTopology": {
                "class_name": "Sequential",
                "config": {"layers": [
                    {"class_name": "Flatten", "config": {"name": "flatten", "batch_input_shape": [null, 2, 2]}},
                    {"class_name": "Dense", "config": {"name": "out", "units": 3}}
                ]}
            },
            "weightsManifest": [{
                "paths": ["group1-shard1of1.bin"],
                "weights": [
                    {"name": "other/kernel", "shape": [4, 3], "dtype": "float32"},
                    {"name": "other/bias", "shape": [3], "dtype": "float32"}
                ]
            }]
        }"#;
        let manifest = ModelJson::parse(json.as_bytes()).unwrap();
        let err = LayersModel::from_artifacts(&manifest, &[weights()]).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelLoad(_)));
        assert!(err.to_string().contains("missing weight out/kernel"));
    }

    #[test]
    fn oversized_weight_shape_is_an_error() {
        let mut manifest = manifest("relu", "float32");
        manifest.weights_manifest[0].weights[0].shape = vec![usize::MAX, 2];
        let err = LayersModel::from_artifacts(&manifest, &[weights()]).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelLoad(_)));
        assert!(err.to_string().contains("oversized"));
    }

    #[test]
    fn relu_and_sigmoid_activations() {
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![-1.0f32, 2.0]).unwrap();
        let relu = Activation::Relu.apply(x.clone());
        assert_eq!(relu.as_slice().unwrap(), &[0.0, 2.0]);
        let sig = Activation::Sigmoid.apply(ArrayD::zeros(IxDyn(&[1, 1])));
        assert!((sig[[0, 0]] - 0.5).abs() < 1e-6);
        assert_eq!(Activation::parse(None).unwrap(), Activation::Linear);
    }
}
