use std::cell::RefCell;
use std::rc::Rc;

use super::model::{fail, load_model, retry_model};
use super::recognition::{clear, on_stroke_completed, recognize};
use super::state::{AppState, BackendEvent};
use crate::loader;
use crate::ui::window::set_download_progress;

/// Handle a backend event. All state transitions go through here.
pub fn handle_backend_event(state: &Rc<RefCell<AppState>>, event: BackendEvent) {
    match event {
        BackendEvent::StrokeCompleted(image) => on_stroke_completed(state, image),
        BackendEvent::RecognizeClicked => recognize(state),
        BackendEvent::ClearClicked => clear(state),
        BackendEvent::RetryClicked => {
            log::info!("Retrying model load");
            retry_model(state);
        }
        BackendEvent::ModelDownloadProgress(downloaded, total) => {
            if let Some(ref window) = state.borrow().window {
                set_download_progress(window, downloaded, total);
            }
        }
        BackendEvent::ModelDownloadComplete => load_model(state, loader::cache_dir()),
        BackendEvent::ModelLoadFailed(err) => fail(state, err),
    }
}
