mod app;
mod config;
mod error;
mod experiment;
mod loader;
mod model;
mod pipeline;
mod raster;
mod ui;

use std::cell::RefCell;
use std::rc::Rc;

use gtk4::gio;
use gtk4::prelude::*;

use app::{AppState, BackendEvent};
use config::Config;

fn main() {
    env_logger::init();
    log::info!("{} ({}) starting", experiment::NAME, experiment::SLUG);

    let application = libadwaita::Application::builder()
        .application_id(experiment::APP_ID)
        .build();

    application.connect_startup(install_actions);
    application.connect_activate(on_activate);
    application.run();
}

fn install_actions(app: &libadwaita::Application) {
    let about = gio::ActionEntry::builder("about")
        .activate(|app: &libadwaita::Application, _, _| {
            ui::window::show_about(app.active_window().as_ref());
        })
        .build();
    let quit = gio::ActionEntry::builder("quit")
        .activate(|app: &libadwaita::Application, _, _| app.quit())
        .build();
    app.add_action_entries([about, quit]);
    app.set_accels_for_action("app.quit", &["<Control>q"]);
}

fn on_activate(app: &libadwaita::Application) {
    if let Some(window) = app.active_window() {
        window.present();
        return;
    }

    let config = Config::load();
    if !Config::exists() {
        if let Err(e) = config.save() {
            log::warn!("Failed to save config: {e}");
        }
    }

    // Widgets and background tasks report to the main thread over this channel
    let (backend_tx, backend_rx) = async_channel::unbounded::<BackendEvent>();

    let window = ui::window::build_window(app, &config, backend_tx.clone());

    let state = match AppState::new(config, backend_tx) {
        Ok(state) => Rc::new(RefCell::new(state)),
        Err(e) => {
            log::error!("Failed to create tokio runtime: {e}");
            app.quit();
            return;
        }
    };

    {
        let mut s = state.borrow_mut();
        window.window.present();
        s.window = Some(window);
    }
    app::refresh_view(&state);

    // Attach backend event handler
    {
        let state_clone = state.clone();
        gtk4::glib::spawn_future_local(async move {
            while let Ok(event) = backend_rx.recv().await {
                app::handle_backend_event(&state_clone, event);
            }
        });
    }

    // Start model download/load
    app::ensure_model(&state);
}
