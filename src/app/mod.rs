mod event_handler;
mod model;
mod recognition;
mod session;
mod state;

pub use event_handler::handle_backend_event;
pub use model::ensure_model;
pub use session::{ModelStatus, Session};
pub use state::{refresh_view, AppState, BackendEvent};
