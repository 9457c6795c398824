use std::cell::RefCell;
use std::rc::Rc;

use super::state::{refresh_view, AppState};
use crate::raster::RasterImage;

/// A stroke finished on the canvas.
pub fn on_stroke_completed(state: &Rc<RefCell<AppState>>, image: Option<RasterImage>) {
    let recorded = state.borrow_mut().session.stroke_completed(image);
    if recorded {
        if let Some(image) = state.borrow().session.image() {
            log::debug!("Drawing updated ({}x{})", image.width(), image.height());
        }
        refresh_view(state);
    } else {
        log::debug!("Stroke ignored");
    }
}

/// Run the pipeline on the current drawing and show the digit.
pub fn recognize(state: &Rc<RefCell<AppState>>) {
    let result = state.borrow_mut().session.recognize();
    match result {
        Ok(digit) => log::info!("Recognized digit {digit}"),
        // The button is insensitive without a drawing, so this is unexpected.
        Err(e) => log::warn!("Recognition failed: {e}"),
    }
    refresh_view(state);
}

/// Wipe the canvas, the drawing and the digit.
pub fn clear(state: &Rc<RefCell<AppState>>) {
    state.borrow_mut().session.clear();
    if let Some(ref window) = state.borrow().window {
        crate::ui::canvas::clear_canvas(&window.canvas);
    }
    refresh_view(state);
}
