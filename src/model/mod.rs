mod layers;
mod topology;

use ndarray::{Array2, ArrayView3};

use crate::error::RecognitionError;

pub use layers::LayersModel;
pub use topology::ModelJson;

/// Spatial input size a model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
}

/// A trained digit classifier.
pub trait Model: Send + Sync {
    /// Declared input size.
    fn input_shape(&self) -> InputShape;

    /// Map a normalized `[batch, height, width]` tensor to `[batch, classes]` scores.
    fn predict(&self, input: ArrayView3<'_, f32>) -> Result<Array2<f32>, RecognitionError>;
}
