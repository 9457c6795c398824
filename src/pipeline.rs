//! Raster image to digit label.
//!
//! The preprocessing mirrors what the network saw during training: RGB pixels
//! are resized to the model input with nearest-neighbor sampling, averaged to
//! grayscale, inverted so ink is bright on a dark background, and scaled to
//! `[0, 1]`.

use ndarray::{Array2, Array3, ArrayView1, ArrayView3, Axis};

use crate::error::RecognitionError;
use crate::model::Model;
use crate::raster::RasterImage;

/// Number of digit classes the model scores.
pub const NUM_CLASSES: usize = 10;

/// Run the full pipeline and return the recognized digit.
pub fn predict(image: &RasterImage, model: &dyn Model) -> Result<u8, RecognitionError> {
    let input = prepare_input(image, model)?;
    let scores = model.predict(input.view())?;

    if scores.dim() != (1, NUM_CLASSES) {
        return Err(RecognitionError::Inference(format!(
            "expected 1x{NUM_CLASSES} scores, model returned {:?}",
            scores.dim()
        )));
    }

    let label = argmax(scores.row(0)).ok_or_else(|| {
        RecognitionError::Inference("model returned no comparable scores".into())
    })?;
    log::debug!("Scores {:?} -> {label}", scores.row(0).to_vec());
    Ok(label as u8)
}

/// Steps 1-5: the normalized `[1, height, width]` tensor fed to the model.
pub fn prepare_input(
    image: &RasterImage,
    model: &dyn Model,
) -> Result<Array3<f32>, RecognitionError> {
    let shape = model.input_shape();
    if shape.height == 0 || shape.width == 0 {
        return Err(RecognitionError::Inference(format!(
            "model declares an empty input shape {}x{}",
            shape.height, shape.width
        )));
    }

    let rgb = image.to_rgb_tensor();
    let resized = resize_nearest(rgb.view(), shape.height, shape.width);
    let gray = grayscale(resized.view());
    let normalized = invert_normalize(gray);
    Ok(normalized.insert_axis(Axis(0)))
}

/// Nearest-neighbor resize of a `[height, width, channels]` tensor.
///
/// Source index is `min(floor(dst * in / out), in - 1)` on each axis, with no
/// corner alignment and no half-pixel offset.
pub fn resize_nearest(src: ArrayView3<'_, f32>, height: usize, width: usize) -> Array3<f32> {
    let (in_h, in_w, channels) = src.dim();
    let rows = nearest_indices(in_h, height);
    let cols = nearest_indices(in_w, width);
    Array3::from_shape_fn((height, width, channels), |(y, x, c)| src[[rows[y], cols[x], c]])
}

fn nearest_indices(input: usize, output: usize) -> Vec<usize> {
    let scale = input as f64 / output as f64;
    (0..output)
        .map(|i| ((i as f64 * scale).floor() as usize).min(input.saturating_sub(1)))
        .collect()
}

/// Mean across the channel axis.
pub fn grayscale(image: ArrayView3<'_, f32>) -> Array2<f32> {
    image
        .mean_axis(Axis(2))
        .unwrap_or_else(|| Array2::zeros((image.dim().0, image.dim().1)))
}

/// `(255 - gray) / 255`
pub fn invert_normalize(mut gray: Array2<f32>) -> Array2<f32> {
    gray.mapv_inplace(|v| (255.0 - v) / 255.0);
    gray
}

/// Index of the largest score; the first one wins on ties. NaN never wins.
pub fn argmax(scores: ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in scores.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
