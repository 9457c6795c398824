use std::sync::Arc;

use crate::error::RecognitionError;
use crate::model::Model;
use crate::pipeline;
use crate::raster::RasterImage;

/// Model availability.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Recognition state for one window: the model, the current drawing and the
/// last recognized digit. Every user or loader event maps to one method.
pub struct Session {
    status: ModelStatus,
    model: Option<Arc<dyn Model>>,
    image: Option<RasterImage>,
    prediction: Option<u8>,
    clear_prediction_on_stroke: bool,
}

impl Session {
    pub fn new(clear_prediction_on_stroke: bool) -> Self {
        Self {
            status: ModelStatus::Loading,
            model: None,
            image: None,
            prediction: None,
            clear_prediction_on_stroke,
        }
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn image(&self) -> Option<&RasterImage> {
        self.image.as_ref()
    }

    pub fn prediction(&self) -> Option<u8> {
        self.prediction
    }

    /// Recognize and Clear are only usable once something has been drawn.
    pub fn controls_enabled(&self) -> bool {
        self.status == ModelStatus::Ready && self.image.is_some()
    }

    /// Restart loading after a failure. Returns false if a load is already
    /// running or a model is present.
    pub fn retry(&mut self) -> bool {
        if matches!(self.status, ModelStatus::Failed(_)) {
            self.status = ModelStatus::Loading;
            true
        } else {
            false
        }
    }

    pub fn model_loaded(&mut self, model: Arc<dyn Model>) {
        if self.status != ModelStatus::Loading {
            log::warn!("Ignoring model delivered while status={:?}", self.status);
            return;
        }
        self.model = Some(model);
        self.image = None;
        self.prediction = None;
        self.status = ModelStatus::Ready;
    }

    pub fn model_failed(&mut self, message: String) {
        if self.status != ModelStatus::Loading {
            log::warn!("Ignoring load failure while status={:?}: {message}", self.status);
            return;
        }
        self.model = None;
        self.status = ModelStatus::Failed(message);
    }

    /// Record the drawing after a stroke. Empty snapshots are ignored.
    /// Returns whether the drawing was recorded.
    pub fn stroke_completed(&mut self, image: Option<RasterImage>) -> bool {
        let Some(image) = image else {
            return false;
        };
        if self.status != ModelStatus::Ready {
            return false;
        }
        self.image = Some(image);
        if self.clear_prediction_on_stroke {
            self.prediction = None;
        }
        true
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.prediction = None;
    }

    /// Run the prediction pipeline on the current drawing and remember the digit.
    pub fn recognize(&mut self) -> Result<u8, RecognitionError> {
        let model = self.model.as_ref().ok_or_else(|| {
            RecognitionError::InvalidInvocation("the model has not been loaded".into())
        })?;
        let image = self.image.as_ref().ok_or_else(|| {
            RecognitionError::InvalidInvocation("nothing has been drawn yet".into())
        })?;

        let digit = pipeline::predict(image, model.as_ref())?;
        self.prediction = Some(digit);
        Ok(digit)
    }
}
