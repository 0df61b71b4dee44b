//! Parley Desktop: egui app state and UI.

use eframe::egui;
use lib::api::ApiClient;
use lib::config::{AuthMode, Config};
use lib::credentials::CredentialStore;
use lib::message::{Message, Role};
use lib::session::{run_command, Command, Outcome, Session, Status};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};

const CHAT_INPUT_HEIGHT: f32 = 110.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;
const CHAT_HELP: &str = "/new - start a new conversation\n/help - show this help";

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Connection,
    Chat,
    Logs,
}

pub struct ParleyApp {
    /// Credential, model, conversation and status. Only changed through its transitions.
    session: Session,
    /// Request functions for the configured dialect; cloned into worker threads.
    client: ApiClient,
    /// Shared runtime that worker threads block on. `None` when it could not be built.
    runtime: Option<tokio::runtime::Runtime>,
    /// Why requests cannot be sent, shown alongside the session overlay.
    runtime_error: Option<String>,
    /// API key or username/password form.
    auth_mode: AuthMode,
    /// Error loading the config file, shown on the Connection screen. Defaults are used.
    config_error: Option<String>,
    /// Connect form fields.
    server_input: String,
    api_key_input: String,
    username_input: String,
    password_input: String,
    /// Current input text for the chat box.
    chat_input: String,
    /// Command list shown above the conversation after `/help`.
    show_help: bool,
    /// Finished commands from worker threads; drained each frame.
    outcome_sender: mpsc::Sender<Outcome>,
    outcome_receiver: mpsc::Receiver<Outcome>,
    /// Commands dispatched whose outcome has not been applied yet.
    in_flight: usize,
    current_screen: Screen,
    /// Status last frame, to switch to Chat when the session becomes ready.
    last_status: Status,
}

impl ParleyApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let (config, config_path, config_error) = match lib::config::load_config(None) {
            Ok((config, path)) => (config, path, None),
            Err(e) => {
                log::error!("failed to load config: {:#}", e);
                (
                    Config::default(),
                    lib::config::default_config_path(),
                    Some(format!("failed to load config: {:#}", e)),
                )
            }
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| e.to_string());

        let mut app = Self::from_parts(config, &config_path, config_error, runtime);
        if app.runtime.is_some() {
            if let Some(command) = app.session.resume() {
                app.dispatch(&cc.egui_ctx, command);
            }
        }
        app
    }

    /// Build the app state from a loaded config and the runtime requests will run on.
    fn from_parts(
        config: Config,
        config_path: &Path,
        config_error: Option<String>,
        runtime: Result<tokio::runtime::Runtime, String>,
    ) -> Self {
        let store = CredentialStore::new(lib::config::resolve_credentials_path(
            &config,
            config_path,
        ));
        let stored = store.load();
        let dialect = config.server.dialect;
        log::info!(
            "dialect {}, auth {:?}, credentials at {}",
            dialect.as_str(),
            config.server.auth,
            store.path().display()
        );

        let (runtime, runtime_error) = match runtime {
            Ok(rt) => (Some(rt), None),
            Err(e) => {
                log::error!("failed to start async runtime: {}", e);
                (None, Some(format!("Cannot send requests: {}", e)))
            }
        };

        let (outcome_sender, outcome_receiver) = mpsc::channel();
        Self {
            session: Session::new(store, dialect.supports_history()),
            client: ApiClient::new(dialect),
            runtime,
            runtime_error,
            auth_mode: config.server.auth,
            config_error,
            server_input: stored
                .server_base
                .clone()
                .or_else(|| lib::config::resolve_default_base(&config))
                .unwrap_or_default(),
            api_key_input: String::new(),
            username_input: String::new(),
            password_input: String::new(),
            chat_input: String::new(),
            show_help: false,
            outcome_sender,
            outcome_receiver,
            in_flight: 0,
            current_screen: Screen::default(),
            last_status: Status::Disconnected,
        }
    }

    /// Run a command on a worker thread; its outcome is applied in `poll_outcomes`.
    fn dispatch(&mut self, ctx: &egui::Context, command: Command) {
        let Some(ref runtime) = self.runtime else {
            log::error!("request dropped: no async runtime");
            return;
        };
        let handle = runtime.handle().clone();
        let client = self.client.clone();
        let tx = self.outcome_sender.clone();
        let ctx = ctx.clone();
        self.in_flight += 1;
        std::thread::spawn(move || {
            let outcome = handle.block_on(run_command(&client, command));
            let _ = tx.send(outcome);
            ctx.request_repaint();
        });
    }

    /// Apply finished outcomes and dispatch whatever each transition asks for next. Call each frame.
    fn poll_outcomes(&mut self, ctx: &egui::Context) {
        while let Ok(outcome) = self.outcome_receiver.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if let Some(next) = self.session.apply(outcome) {
                self.dispatch(ctx, next);
            }
        }
        let status = self.session.status();
        if status == Status::Ready && self.last_status != Status::Ready {
            self.current_screen = Screen::Chat;
        }
        self.last_status = status;
    }

    fn submit_connect(&mut self, ctx: &egui::Context) {
        if self.runtime.is_none() {
            return;
        }
        let command = match self.auth_mode {
            AuthMode::ApiKey => self.session.connect(&self.server_input, &self.api_key_input),
            AuthMode::Login => self.session.begin_login(
                &self.server_input,
                &self.username_input,
                &self.password_input,
            ),
        };
        // Validation failures are already on the session's error overlay.
        if let Ok(command) = command {
            self.api_key_input.clear();
            self.password_input.clear();
            self.dispatch(ctx, command);
        }
    }

    /// Send the chat input, or handle a slash command.
    fn submit_chat(&mut self, ctx: &egui::Context) {
        let message = self.chat_input.trim().to_string();
        if message.eq_ignore_ascii_case("/new") {
            self.chat_input.clear();
            self.session.reset_conversation();
            return;
        }
        if message.eq_ignore_ascii_case("/help") {
            self.chat_input.clear();
            self.show_help = true;
            return;
        }
        if self.runtime.is_none() {
            return;
        }
        match self.session.begin_send(&message) {
            Ok(Some(command)) => {
                self.chat_input.clear();
                self.dispatch(ctx, command);
            }
            Ok(None) => {}
            Err(e) => log::warn!("send rejected: {}", e),
        }
    }

    fn status_text(&self) -> String {
        let status = self.session.status();
        let mut text = match (status, self.session.model()) {
            (Status::Ready, Some(model)) => format!("ready · {}", model),
            _ => status.label().to_string(),
        };
        if self.in_flight > 0 {
            text.push_str(" …");
        }
        text
    }

    fn render_chat_message(ui: &mut egui::Ui, m: &Message) {
        let is_user = m.role == Role::User;
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style()
                    .visuals
                    .widgets
                    .noninteractive
                    .bg_stroke
                    .color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| {
            match m.role {
                Role::User => {
                    ui.label(egui::RichText::new(&m.text).strong());
                }
                Role::Assistant => {
                    ui.label(&m.text);
                }
            }
        });
    }

    fn ui_error_overlay(&mut self, ui: &mut egui::Ui) {
        if let Some(ref err) = self.runtime_error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err.as_str());
        }
        let mut dismiss = false;
        if let Some(err) = self.session.error() {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::RED, err);
                if ui.small_button("✕").clicked() {
                    dismiss = true;
                }
            });
        }
        if dismiss {
            self.session.clear_error();
        }
    }

    fn ui_connection_screen(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.add_space(24.0);
        ui.heading("Connection");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        if let Some(ref err) = self.config_error {
            ui.colored_label(egui::Color32::YELLOW, err.as_str());
            ui.add_space(8.0);
        }

        let mut submit = false;
        egui::Grid::new("connect_form")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("Server URL");
                ui.add(
                    egui::TextEdit::singleline(&mut self.server_input)
                        .hint_text("https://chat.example.com")
                        .desired_width(360.0),
                );
                ui.end_row();

                match self.auth_mode {
                    AuthMode::ApiKey => {
                        ui.label("API key");
                        let r = ui.add(
                            egui::TextEdit::singleline(&mut self.api_key_input)
                                .password(true)
                                .desired_width(360.0),
                        );
                        if r.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            submit = true;
                        }
                        ui.end_row();
                    }
                    AuthMode::Login => {
                        ui.label("Username");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.username_input)
                                .desired_width(360.0),
                        );
                        ui.end_row();
                        ui.label("Password");
                        let r = ui.add(
                            egui::TextEdit::singleline(&mut self.password_input)
                                .password(true)
                                .desired_width(360.0),
                        );
                        if r.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            submit = true;
                        }
                        ui.end_row();
                    }
                }
            });

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            if ui.button("Connect").clicked() {
                submit = true;
            }
            ui.add_space(12.0);
            ui.label(format!("Status: {}", self.status_text()));
        });
        if submit {
            self.submit_connect(ctx);
        }

        if let Some(credential) = self.session.credential() {
            ui.add_space(8.0);
            ui.label(
                egui::RichText::new(format!(
                    "Server: {}",
                    lib::api::normalize_base(&credential.server_base)
                ))
                .weak(),
            );
        }
        self.ui_error_overlay(ui);
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    /// Render the chat UI (messages + input). Messages area fills the space with stick-to-bottom; input and controls are fixed at bottom.
    fn ui_chat(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let can_send = self.session.status() == Status::Ready;

        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom_section_height =
            CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let available = ui.available_height();
        let messages_height = (available - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);

        egui::ScrollArea::vertical()
            .max_height(messages_height)
            .min_scrolled_height(messages_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                // Keep the scrollbar on the right even when messages are narrow.
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                if self.show_help {
                    egui::Frame::none()
                        .stroke(egui::Stroke::new(
                            1.0,
                            ui.style().visuals.widgets.noninteractive.bg_stroke.color,
                        ))
                        .rounding(egui::Rounding::same(8.0))
                        .inner_margin(egui::Margin::same(8.0))
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label(egui::RichText::new(CHAT_HELP).monospace());
                                if ui.small_button("✕").clicked() {
                                    self.show_help = false;
                                }
                            });
                        });
                    ui.add_space(8.0);
                }
                if self.session.conversation().is_empty() {
                    ui.label(egui::RichText::new("No messages yet.").weak());
                }
                for m in self.session.conversation() {
                    Self::render_chat_message(ui, m);
                    ui.add_space(8.0);
                }
            });

        ui.add_space(8.0);

        let response = ui
            .add_enabled_ui(can_send, |ui| {
                ui.add_sized(
                    [ui.available_width(), CHAT_INPUT_HEIGHT],
                    egui::TextEdit::multiline(&mut self.chat_input),
                )
            })
            .inner;
        ui.add_space(8.0);

        let mut send_now = false;
        let mut reset = false;
        let status = self.status_text();
        ui.horizontal(|ui| {
            if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
                send_now = true;
            }
            if ui.add_enabled(can_send, egui::Button::new("/new")).clicked() {
                reset = true;
            }
            ui.add_space(12.0);
            ui.label(format!("Status: {}", status));
        });
        if reset {
            self.session.reset_conversation();
        }
        if can_send && response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl) && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send_now = true;
            }
        }
        if send_now {
            self.submit_chat(ctx);
        }

        if !can_send {
            ui.add_space(8.0);
            ui.label("Connect to a server to chat.");
        }
        self.ui_error_overlay(ui);
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for ParleyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_outcomes(ctx);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.heading("Parley");
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(self.status_text());
                        });
                    });
                    ui.add_space(16.0);
                });
        });

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Connection, "Connection")
                            .clicked()
                        {
                            *current_screen = Screen::Connection;
                        }
                        ui.add_space(12.0);
                        if ui.selectable_label(*current_screen == Screen::Chat, "Chat").clicked() {
                            *current_screen = Screen::Chat;
                        }
                        ui.add_space(12.0);
                        if ui.selectable_label(*current_screen == Screen::Logs, "Logs").clicked() {
                            *current_screen = Screen::Logs;
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Connection => self.ui_connection_screen(ui, ctx),
                    Screen::Chat => {
                        ui.add_space(24.0);
                        ui.heading("Chat");
                        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
                        self.ui_chat(ui, ctx);
                    }
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib::config::Dialect;
    use std::time::{Duration, Instant};

    fn runtime() -> Result<tokio::runtime::Runtime, String> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| e.to_string())
    }

    fn app(dir: &tempfile::TempDir, runtime: Result<tokio::runtime::Runtime, String>) -> ParleyApp {
        let mut config = Config::default();
        config.server.dialect = Dialect::Chats;
        ParleyApp::from_parts(config, &dir.path().join("config.json"), None, runtime)
    }

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[test]
    fn missing_runtime_is_shown_and_blocks_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, Err("no threads".to_string()));
        assert!(app.runtime_error.as_deref().unwrap().contains("no threads"));

        let ctx = egui::Context::default();
        app.server_input = closed_port_url();
        app.api_key_input = "sk-test".to_string();
        app.submit_connect(&ctx);
        assert_eq!(app.in_flight, 0);
        assert_eq!(app.session.status(), Status::Disconnected);
    }

    #[test]
    fn failed_discovery_outcome_reaches_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, runtime());
        let ctx = egui::Context::default();
        app.server_input = closed_port_url();
        app.api_key_input = "sk-test".to_string();
        app.submit_connect(&ctx);
        assert_eq!(app.in_flight, 1);
        assert!(app.api_key_input.is_empty());

        let deadline = Instant::now() + Duration::from_secs(10);
        while app.in_flight > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            app.poll_outcomes(&ctx);
        }
        assert_eq!(app.in_flight, 0);
        assert_eq!(app.session.status(), Status::Discovering);
        assert_eq!(app.session.error(), Some(lib::session::DISCOVERY_FAILED));
    }

    #[test]
    fn help_command_shows_help_in_chat() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, runtime());
        app.current_screen = Screen::Chat;
        app.chat_input = " /help ".to_string();
        app.submit_chat(&egui::Context::default());
        assert!(app.show_help);
        assert!(app.chat_input.is_empty());
        assert!(app.current_screen == Screen::Chat);
        assert!(app.session.conversation().is_empty());
        assert_eq!(app.in_flight, 0);
    }
}
