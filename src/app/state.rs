use crate::config::Config;
use crate::raster::RasterImage;
use crate::ui::window::WindowWidgets;

use super::session::Session;

/// Events sent from widgets and background tasks to the GTK main thread.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    StrokeCompleted(Option<RasterImage>),
    RecognizeClicked,
    ClearClicked,
    RetryClicked,
    ModelDownloadProgress(u64, u64),
    ModelDownloadComplete,
    ModelLoadFailed(String),
}

/// Central application state. Lives on the GTK main thread inside Rc<RefCell<>>.
pub struct AppState {
    pub config: Config,
    pub session: Session,
    pub tokio_rt: tokio::runtime::Runtime,
    pub backend_sender: async_channel::Sender<BackendEvent>,

    // UI handles
    pub window: Option<WindowWidgets>,
}

impl AppState {
    pub fn new(
        config: Config,
        sender: async_channel::Sender<BackendEvent>,
    ) -> std::io::Result<Self> {
        let tokio_rt = tokio::runtime::Runtime::new()?;
        let session = Session::new(config.clear_prediction_on_stroke);

        Ok(Self {
            config,
            session,
            tokio_rt,
            backend_sender: sender,
            window: None,
        })
    }
}

/// Re-render the window from the session.
pub fn refresh_view(state: &std::rc::Rc<std::cell::RefCell<AppState>>) {
    let s = state.borrow();
    if let Some(ref window) = s.window {
        crate::ui::window::render(window, &s.session);
    }
}
