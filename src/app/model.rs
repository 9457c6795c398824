use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use gtk4::glib;

use super::state::{refresh_view, AppState, BackendEvent};
use crate::loader::{self, ModelSource};
use crate::model::{LayersModel, Model};

/// Download the model if needed, then load it.
pub fn ensure_model(state: &Rc<RefCell<AppState>>) {
    let base = state.borrow().config.models_base.clone();
    let source = match ModelSource::from_base(&base) {
        Ok(source) => source,
        Err(e) => {
            fail(state, e.to_string());
            return;
        }
    };
    log::info!("Model source: {source}");

    match source {
        ModelSource::Local(dir) => load_model(state, dir),
        ModelSource::Remote(ref url) if loader::cached_model_exists(url) => {
            load_model(state, loader::cache_dir())
        }
        ModelSource::Remote(url) => {
            log::info!("Model not cached, starting download");
            let sender = state.borrow().backend_sender.clone();
            let progress_sender = sender.clone();

            state.borrow().tokio_rt.spawn(async move {
                // Run in its own task so a panic still reaches the window as a failure.
                let download = tokio::spawn(async move {
                    loader::download_model(&url, move |downloaded, total| {
                        let _ = progress_sender
                            .try_send(BackendEvent::ModelDownloadProgress(downloaded, total));
                    })
                    .await
                });

                let event = match download.await {
                    Ok(Ok(())) => BackendEvent::ModelDownloadComplete,
                    Ok(Err(e)) => {
                        BackendEvent::ModelLoadFailed(format!("Model download failed: {e}"))
                    }
                    Err(e) => {
                        BackendEvent::ModelLoadFailed(format!("Model download panicked: {e}"))
                    }
                };
                let _ = sender.send(event).await;
            });
        }
    }
}

/// Build the model in a blocking task, then deliver it to the main thread.
pub fn load_model(state: &Rc<RefCell<AppState>>, dir: PathBuf) {
    log::info!("Loading model from {}", dir.display());

    let sender = state.borrow().backend_sender.clone();

    // The session lives in an Rc<RefCell>, so the model travels back over its
    // own channel instead of through a BackendEvent.
    let (model_tx, model_rx) = async_channel::bounded::<LayersModel>(1);

    state.borrow().tokio_rt.spawn(async move {
        let result = tokio::task::spawn_blocking(move || loader::load_model(&dir)).await;

        match result {
            Ok(Ok(model)) => {
                let _ = model_tx.send(model).await;
            }
            Ok(Err(e)) => {
                let _ = sender
                    .send(BackendEvent::ModelLoadFailed(e.to_string()))
                    .await;
            }
            Err(e) => {
                let _ = sender
                    .send(BackendEvent::ModelLoadFailed(format!(
                        "Model load panicked: {e}"
                    )))
                    .await;
            }
        }
    });

    let state_clone = state.clone();
    glib::spawn_future_local(async move {
        if let Ok(model) = model_rx.recv().await {
            let model: Arc<dyn Model> = Arc::new(model);
            state_clone.borrow_mut().session.model_loaded(model);
            refresh_view(&state_clone);
            log::info!("Model ready");
        }
    });
}

/// Record a load failure and show it.
pub fn fail(state: &Rc<RefCell<AppState>>, message: String) {
    log::error!("{message}");
    state.borrow_mut().session.model_failed(message);
    refresh_view(state);
}

/// Forget any cached download and load again.
pub fn retry_model(state: &Rc<RefCell<AppState>>) {
    if !state.borrow_mut().session.retry() {
        return;
    }
    let base = state.borrow().config.models_base.clone();
    if let Ok(source) = ModelSource::from_base(&base) {
        if let Err(e) = loader::discard_cache(&source) {
            log::warn!("Failed to remove cached model: {e}");
        }
    }
    refresh_view(state);
    ensure_model(state);
}
