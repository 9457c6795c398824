use gtk4::glib;
use gtk4::prelude::*;
use libadwaita::prelude::*;

use super::canvas::{build_canvas, CanvasWidgets};
use crate::app::{BackendEvent, ModelStatus, Session};
use crate::config::Config;
use crate::experiment;

const PAGE_LOADING: &str = "loading";
const PAGE_READY: &str = "ready";
const PAGE_FAILED: &str = "failed";

/// Handles returned from building the main window.
pub struct WindowWidgets {
    pub window: libadwaita::ApplicationWindow,
    pub stack: gtk4::Stack,
    pub progress_bar: gtk4::ProgressBar,
    pub canvas: CanvasWidgets,
    pub recognize_button: gtk4::Button,
    pub clear_button: gtk4::Button,
    pub digit_label: gtk4::Label,
    pub error_page: libadwaita::StatusPage,
}

/// Build the main window. Buttons and canvas report to `backend_sender`.
pub fn build_window(
    app: &libadwaita::Application,
    config: &Config,
    backend_sender: async_channel::Sender<BackendEvent>,
) -> WindowWidgets {
    install_css();

    let window = libadwaita::ApplicationWindow::builder()
        .application(app)
        .title(experiment::NAME)
        .resizable(false)
        .build();

    let toolbar_view = libadwaita::ToolbarView::new();
    let header = libadwaita::HeaderBar::new();
    header.set_title_widget(Some(&libadwaita::WindowTitle::new(
        experiment::NAME,
        experiment::DESCRIPTION,
    )));

    let menu_button = gtk4::MenuButton::new();
    menu_button.set_icon_name("open-menu-symbolic");

    let menu = gtk4::gio::Menu::new();
    menu.append(Some("About Digits Recognition"), Some("app.about"));
    menu.append(Some("Quit"), Some("app.quit"));

    menu_button.set_menu_model(Some(&menu));
    header.pack_end(&menu_button);

    toolbar_view.add_top_bar(&header);

    let stack = gtk4::Stack::new();
    stack.set_transition_type(gtk4::StackTransitionType::Crossfade);

    // --- Loading page ---
    let loading = gtk4::Box::new(gtk4::Orientation::Vertical, 8);
    loading.set_valign(gtk4::Align::Center);
    loading.set_margin_start(24);
    loading.set_margin_end(24);
    let loading_label = gtk4::Label::new(Some("Loading the model"));
    loading_label.set_xalign(0.0);
    let progress_bar = gtk4::ProgressBar::new();
    progress_bar.set_width_request(3 * experiment::CANVAS_WIDTH);
    loading.append(&loading_label);
    loading.append(&progress_bar);
    stack.add_named(&loading, Some(PAGE_LOADING));
    pulse_while_indeterminate(&progress_bar);

    // --- Ready page ---
    let ready = gtk4::Box::new(gtk4::Orientation::Horizontal, 0);
    ready.set_margin_start(16);
    ready.set_margin_end(16);
    ready.set_margin_top(16);
    ready.set_margin_bottom(16);

    let canvas = build_canvas(
        experiment::CANVAS_WIDTH,
        experiment::CANVAS_HEIGHT,
        config.stroke_width,
        backend_sender.clone(),
    );
    let canvas_frame = gtk4::Frame::new(None);
    canvas_frame.add_css_class("digit-paper");
    canvas_frame.set_child(Some(&canvas.area));
    ready.append(&canvas_frame);

    let actions = gtk4::Box::new(gtk4::Orientation::Vertical, 8);
    actions.set_valign(gtk4::Align::Center);
    actions.set_margin_start(16);
    actions.set_margin_end(16);

    let recognize_button = action_button("Recognize", "media-playback-start-symbolic");
    recognize_button.add_css_class("suggested-action");
    let clear_button = action_button("Clear", "user-trash-symbolic");
    clear_button.add_css_class("destructive-action");
    actions.append(&recognize_button);
    actions.append(&clear_button);
    ready.append(&actions);

    let digit_label = gtk4::Label::new(None);
    digit_label.add_css_class("recognized-digit");
    digit_label.set_size_request(experiment::CANVAS_WIDTH, experiment::CANVAS_HEIGHT);
    digit_label.set_halign(gtk4::Align::Center);
    digit_label.set_valign(gtk4::Align::Center);
    let digit_frame = gtk4::Frame::new(None);
    digit_frame.add_css_class("digit-paper");
    digit_frame.set_child(Some(&digit_label));
    ready.append(&digit_frame);

    stack.add_named(&ready, Some(PAGE_READY));

    // --- Failure page ---
    let retry_button = gtk4::Button::builder()
        .label("Retry")
        .halign(gtk4::Align::Center)
        .build();
    retry_button.add_css_class("pill");
    retry_button.add_css_class("suggested-action");
    let error_page = libadwaita::StatusPage::builder()
        .icon_name("dialog-error-symbolic")
        .title("The model could not be loaded")
        .child(&retry_button)
        .build();
    stack.add_named(&error_page, Some(PAGE_FAILED));

    {
        let sender = backend_sender.clone();
        recognize_button.connect_clicked(move |_| {
            let _ = sender.try_send(BackendEvent::RecognizeClicked);
        });
    }
    {
        let sender = backend_sender.clone();
        clear_button.connect_clicked(move |_| {
            let _ = sender.try_send(BackendEvent::ClearClicked);
        });
    }
    retry_button.connect_clicked(move |_| {
        let _ = backend_sender.try_send(BackendEvent::RetryClicked);
    });

    toolbar_view.set_content(Some(&stack));
    window.set_content(Some(&toolbar_view));

    WindowWidgets {
        window,
        stack,
        progress_bar,
        canvas,
        recognize_button,
        clear_button,
        digit_label,
        error_page,
    }
}

/// Bring every widget in line with the session.
pub fn render(widgets: &WindowWidgets, session: &Session) {
    match session.status() {
        ModelStatus::Loading => {
            widgets.progress_bar.set_fraction(0.0);
            widgets.progress_bar.set_show_text(false);
            widgets.stack.set_visible_child_name(PAGE_LOADING);
        }
        ModelStatus::Ready => widgets.stack.set_visible_child_name(PAGE_READY),
        ModelStatus::Failed(message) => {
            widgets.error_page.set_description(Some(message.as_str()));
            widgets.stack.set_visible_child_name(PAGE_FAILED);
        }
    }

    let enabled = session.controls_enabled();
    widgets.recognize_button.set_sensitive(enabled);
    widgets.clear_button.set_sensitive(enabled);

    let digit = session
        .prediction()
        .map(|d| d.to_string())
        .unwrap_or_default();
    widgets.digit_label.set_text(&digit);
}

/// Show weight download progress on the loading page.
pub fn set_download_progress(widgets: &WindowWidgets, downloaded: u64, total: u64) {
    let bar = &widgets.progress_bar;
    let kb_done = downloaded as f64 / 1024.0;
    bar.set_show_text(true);
    if total > 0 {
        bar.set_fraction((downloaded as f64 / total as f64).min(1.0));
        let kb_total = total as f64 / 1024.0;
        bar.set_text(Some(&format!(
            "Downloading weights: {kb_done:.0} / {kb_total:.0} KB"
        )));
    } else {
        bar.pulse();
        bar.set_text(Some(&format!("Downloading weights: {kb_done:.0} KB")));
    }
}

pub fn show_about(parent: Option<&gtk4::Window>) {
    let about = libadwaita::AboutDialog::builder()
        .application_name(experiment::NAME)
        .application_icon("applications-science-symbolic")
        .comments(experiment::DESCRIPTION)
        .version(env!("CARGO_PKG_VERSION"))
        .license_type(gtk4::License::MitX11)
        .build();
    about.present(parent);
}

fn action_button(label: &str, icon: &str) -> gtk4::Button {
    let content = libadwaita::ButtonContent::builder()
        .label(label)
        .icon_name(icon)
        .build();
    let button = gtk4::Button::builder()
        .child(&content)
        .sensitive(false)
        .build();
    button.add_css_class("flat");
    button
}

/// Keep the bar moving until real download progress arrives.
fn pulse_while_indeterminate(bar: &gtk4::ProgressBar) {
    let weak = bar.downgrade();
    glib::timeout_add_local(std::time::Duration::from_millis(120), move || {
        let Some(bar) = weak.upgrade() else {
            return glib::ControlFlow::Break;
        };
        if bar.is_mapped() && bar.fraction() == 0.0 {
            bar.pulse();
        }
        glib::ControlFlow::Continue
    });
}

fn install_css() {
    let css_provider = gtk4::CssProvider::new();
    css_provider.load_from_string(
        r#"
        .digit-paper {
            background-color: white;
        }
        .recognized-digit {
            color: black;
            font-size: 120px;
            font-weight: bold;
        }
        "#,
    );
    match gtk4::gdk::Display::default() {
        Some(display) => gtk4::style_context_add_provider_for_display(
            &display,
            &css_provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        ),
        None => log::warn!("No display available for styling"),
    }
}
