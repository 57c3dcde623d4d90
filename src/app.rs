use crate::chat::ChatState;
use crate::client::ArtClient;
use crate::conversation::{Message, MessageAction, Sender};
use crate::event::AppEvent;
use crate::theme::Theme;
use crate::ui::clipboard::CopyFeedback;
use crate::ui::layout::{PanelLayout, MIN_PANE_SHARE};
use crate::ui::observations::{render_observations, CopyRequest};
use eframe::egui::{self, RichText, ScrollArea};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{error, info};

const API_KEY_HINT: &str = "Make sure GEMINI_API_KEY is set in the environment and restart.";
const INIT_POLL: Duration = Duration::from_millis(100);

enum Phase {
    Initializing,
    Ready(ArtClient),
    Failed(String),
}

/// Deferred UI intents, applied once the frame has been laid out.
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    ToggleSidebar,
    NewChat,
    Select(String),
    Submit,
    Stop,
    CopyMessage { message_id: u64, text: String },
    CopyPayload(String),
    Rate { message_id: u64, action: MessageAction },
    DismissError,
}

pub struct ArtDemoApp {
    rx: Receiver<AppEvent>,
    phase: Phase,
    chat: ChatState,
    theme: Theme,
    layout: PanelLayout,
    copy_feedback: CopyFeedback,
    input_buffer: String,
    sidebar_open: bool,
    model_label: String,
    scroll_to_bottom: bool,
}

impl ArtDemoApp {
    pub fn new(rx: Receiver<AppEvent>, ctx: &egui::Context) -> Self {
        let theme = Theme::default();
        theme.apply_visuals(ctx);
        Self {
            rx,
            phase: Phase::Initializing,
            chat: ChatState::new(),
            theme,
            layout: PanelLayout::default(),
            copy_feedback: CopyFeedback::default(),
            input_buffer: String::new(),
            sidebar_open: true,
            model_label: String::new(),
            scroll_to_bottom: false,
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.chat.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Initialized(Ok(client)) => {
                info!(model = client.model(), "ART instance initialized");
                self.model_label = client.model().to_string();
                self.chat.start(&client);
                self.layout.reset();
                self.chat.log_diagnostic("ART instance initialized");
                self.phase = Phase::Ready(client);
            }
            AppEvent::Initialized(Err(message)) => {
                error!(error = %message, "failed to initialize ART");
                self.phase = Phase::Failed(message);
            }
            event @ AppEvent::QueryCompleted { .. } => {
                self.chat.apply_event(event);
                self.scroll_to_bottom = true;
            }
            other => self.chat.apply_event(other),
        }
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: UiAction, now: Instant) {
        let Phase::Ready(client) = &self.phase else {
            return;
        };

        match action {
            UiAction::ToggleSidebar => self.sidebar_open = !self.sidebar_open,
            UiAction::NewChat => {
                if self.chat.new_chat(client).is_some() {
                    self.layout.reset();
                    self.input_buffer.clear();
                }
            }
            UiAction::Select(conversation_id) => match self.chat.select(&conversation_id, client) {
                Ok(true) => {
                    let count = self.chat.store().active_observations().len();
                    self.layout.on_select(count);
                    self.scroll_to_bottom = true;
                }
                Ok(false) => {}
                Err(err) => self.chat.log_diagnostic(format!("select rejected: {err}")),
            },
            UiAction::Submit => {
                let text = self.input_buffer.trim().to_string();
                if self.chat.submit_query(&text, client) {
                    self.input_buffer.clear();
                    self.scroll_to_bottom = true;
                }
            }
            UiAction::Stop => {
                self.chat.stop_generating(client);
            }
            UiAction::CopyMessage { message_id, text } => {
                ctx.copy_text(text);
                self.copy_feedback.mark_message(message_id, now);
            }
            UiAction::CopyPayload(payload) => {
                ctx.copy_text(payload.clone());
                self.copy_feedback.mark_payload(payload, now);
            }
            UiAction::Rate { message_id, action } => {
                info!(message_id, action = action.label(), "message feedback");
                self.chat
                    .log_diagnostic(format!("message {message_id}: {}", action.label()));
            }
            UiAction::DismissError => self.chat.dismiss_error(),
        }
    }

    fn render_initializing(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.4);
                ui.add(egui::Spinner::new().size(32.0));
                ui.label(RichText::new("Initializing ART Demo...").size(18.0));
            });
        });
    }

    fn render_init_error(&self, ctx: &egui::Context, message: &str) {
        let theme = &self.theme;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.3);
                theme.panel_frame(theme.surface_2, Theme::P24 as i8).show(ui, |ui| {
                    ui.label(
                        RichText::new("Initialization Error")
                            .color(theme.danger)
                            .size(20.0)
                            .strong(),
                    );
                    ui.add_space(theme.spacing_8);
                    ui.label(RichText::new(message).color(theme.text_primary));
                    ui.add_space(theme.spacing_8);
                    ui.label(RichText::new(API_KEY_HINT).color(theme.text_muted).size(12.0));
                });
            });
        });
    }

    fn render_sidebar(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        if !self.sidebar_open {
            return;
        }
        let theme = &self.theme;
        let responding = self.chat.is_responding();
        let active_id = self.chat.store().active_id();

        egui::SidePanel::left("chat_list")
            .resizable(false)
            .exact_width(240.0)
            .frame(
                egui::Frame::new()
                    .fill(theme.surface_0)
                    .inner_margin(egui::Margin::same(Theme::P12 as i8)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Chats");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui
                            .add_enabled(!responding, egui::Button::new("+ New Chat"))
                            .clicked()
                        {
                            actions.push(UiAction::NewChat);
                        }
                    });
                });
                ui.separator();

                ScrollArea::vertical()
                    .id_salt("conversation_list")
                    .show(ui, |ui| {
                        for conversation in self.chat.store().conversations() {
                            let selected = active_id == Some(conversation.id.as_str());
                            let response = ui.add_enabled(
                                !responding || selected,
                                egui::SelectableLabel::new(selected, &conversation.title),
                            );
                            if response.clicked() {
                                actions.push(UiAction::Select(conversation.id.clone()));
                            }
                        }
                    });
            });
    }

    fn render_header(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let theme = &self.theme;
        let title = self
            .chat
            .store()
            .active()
            .map(|conversation| conversation.title.as_str())
            .unwrap_or("ART Chat");

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let toggle = if self.sidebar_open { "<" } else { "☰" };
                if ui.button(toggle).clicked() {
                    actions.push(UiAction::ToggleSidebar);
                }
                ui.strong(title);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_enabled(
                        false,
                        egui::Button::new(format!("Model: {}", self.model_label)),
                    );
                });
            });

            if let Some(message) = self.chat.global_error() {
                theme.banner_frame().show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(message).color(theme.text_on_accent));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("Dismiss").clicked() {
                                actions.push(UiAction::DismissError);
                            }
                        });
                    });
                });
                ui.add_space(theme.spacing_4);
            }
        });
    }

    fn render_observation_panel(
        &mut self,
        ctx: &egui::Context,
        now: Instant,
        actions: &mut Vec<UiAction>,
    ) {
        let count = self.chat.store().active_observations().len();
        self.layout.observe(count);
        if !PanelLayout::shows_observations(count) {
            return;
        }

        let available = ctx.available_rect().width().max(1.0);
        let mut panel = egui::SidePanel::right("observation_panel")
            .resizable(true)
            .min_width(available * MIN_PANE_SHARE)
            .max_width(available * (1.0 - MIN_PANE_SHARE));
        if let Some(share) = self.layout.take_forced_share() {
            panel = panel.exact_width(available * share);
        }

        let theme = &self.theme;
        let observations = self.chat.store().active_observations();
        let feedback = &self.copy_feedback;
        let shown = panel.show(ctx, |ui| {
            render_observations(ui, theme, observations, feedback, now, &mut |request| {
                let CopyRequest(payload) = request;
                actions.push(UiAction::CopyPayload(payload));
            });
        });
        self.layout.record_share(shown.response.rect.width() / available);
    }

    fn render_chat(&mut self, ctx: &egui::Context, now: Instant, actions: &mut Vec<UiAction>) {
        let focus_requested = self.chat.take_focus_request();
        let scroll_to_bottom = std::mem::take(&mut self.scroll_to_bottom);
        let responding = self.chat.is_responding();
        let has_active = self.chat.store().active().is_some();
        let theme = &self.theme;

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::TopBottomPanel::bottom("composer")
                .show_separator_line(false)
                .show_inside(ui, |ui| {
                    ui.add_space(theme.spacing_8);
                    render_composer(
                        ui,
                        theme,
                        &mut self.input_buffer,
                        has_active && !responding,
                        focus_requested,
                        actions,
                    );

                    let subscription = self.chat.subscriptions().state().name();
                    egui::CollapsingHeader::new(format!("Diagnostics (observations: {subscription})"))
                        .id_salt("diagnostics")
                        .default_open(false)
                        .show(ui, |ui| {
                            ScrollArea::vertical()
                                .id_salt("diagnostics_log")
                                .max_height(90.0)
                                .stick_to_bottom(true)
                                .show(ui, |ui| {
                                    for entry in self.chat.diagnostics() {
                                        ui.label(RichText::new(entry).size(12.0));
                                    }
                                });
                        });
                });

            ScrollArea::vertical()
                .id_salt("chat_transcript")
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for message in self.chat.store().active_messages() {
                        let copied = self.copy_feedback.is_message_copied(message.id, now);
                        render_message(ui, theme, message, copied, actions);
                        ui.add_space(theme.spacing_8);
                    }

                    if responding {
                        ui.horizontal(|ui| {
                            ui.add(egui::Spinner::new());
                            ui.label(RichText::new("Assistant is typing...").color(theme.text_muted));
                            if ui.button("Stop generating").clicked() {
                                actions.push(UiAction::Stop);
                            }
                        });
                    }

                    if scroll_to_bottom {
                        ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                    }
                });
        });
    }
}

fn avatar(ui: &mut egui::Ui, theme: &Theme, sender: Sender) {
    let glyph = match sender {
        Sender::User => "You",
        Sender::Assistant => "AI",
        Sender::Error => "!",
    };
    let (rect, _) = ui.allocate_exact_size(
        egui::vec2(theme.avatar_size, theme.avatar_size),
        egui::Sense::hover(),
    );
    ui.painter()
        .circle_filled(rect.center(), theme.avatar_size / 2.0, theme.bubble_fill(sender));
    ui.painter().text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        glyph,
        egui::FontId::proportional(11.0),
        theme.text_on_accent,
    );
}

fn render_message(
    ui: &mut egui::Ui,
    theme: &Theme,
    message: &Message,
    copied: bool,
    actions: &mut Vec<UiAction>,
) {
    let layout = if message.sender == Sender::User {
        egui::Layout::right_to_left(egui::Align::TOP)
    } else {
        egui::Layout::left_to_right(egui::Align::TOP)
    };
    let max_bubble = ui.available_width() * 0.7;

    ui.with_layout(layout, |ui| {
        avatar(ui, theme, message.sender);
        ui.vertical(|ui| {
            ui.set_max_width(max_bubble);
            theme.bubble_frame(message.sender).show(ui, |ui| {
                ui.label(RichText::new(&message.text).color(theme.text_primary));
            });

            ui.horizontal(|ui| {
                if let Some(timestamp) = &message.timestamp {
                    ui.label(RichText::new(timestamp).color(theme.text_muted).size(11.0));
                }
                if message.allows(MessageAction::Copy) {
                    let label = if copied { "Copied" } else { "Copy" };
                    if ui.small_button(label).clicked() {
                        actions.push(UiAction::CopyMessage {
                            message_id: message.id,
                            text: message.text.clone(),
                        });
                    }
                }
                for (action, glyph) in [(MessageAction::Like, "👍"), (MessageAction::Dislike, "👎")] {
                    if message.allows(action) && ui.small_button(glyph).clicked() {
                        actions.push(UiAction::Rate {
                            message_id: message.id,
                            action,
                        });
                    }
                }
            });
        });
    });
}

fn render_composer(
    ui: &mut egui::Ui,
    theme: &Theme,
    buffer: &mut String,
    enabled: bool,
    focus_requested: bool,
    actions: &mut Vec<UiAction>,
) {
    let input_id = ui.make_persistent_id("composer_input");
    let has_focus = ui.memory(|memory| memory.has_focus(input_id));
    // Plain Enter submits; Shift+Enter falls through to the editor as a newline.
    let enter_to_send = enabled
        && has_focus
        && ui.input_mut(|input| {
            !input.modifiers.shift && input.consume_key(egui::Modifiers::NONE, egui::Key::Enter)
        });

    let hint = if enabled {
        "Type a message... (Shift+Enter for a new line)"
    } else {
        "Waiting for response..."
    };

    theme.composer_frame().show(ui, |ui| {
        ui.horizontal(|ui| {
            let send_width = 72.0;
            let response = ui.add_enabled(
                enabled,
                egui::TextEdit::multiline(buffer)
                    .id(input_id)
                    .desired_rows(2)
                    .desired_width(ui.available_width() - send_width)
                    .hint_text(hint),
            );
            if focus_requested && enabled {
                response.request_focus();
            }

            let can_send = enabled && !buffer.trim().is_empty();
            let clicked = ui
                .add_enabled(can_send, egui::Button::new("Send").fill(theme.accent_primary))
                .clicked();
            if clicked || (enter_to_send && can_send) {
                actions.push(UiAction::Submit);
            }
        });
    });
}

impl eframe::App for ArtDemoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        let now = Instant::now();
        self.copy_feedback.expire(now);
        if let Some(deadline) = self.copy_feedback.next_deadline() {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }

        match &self.phase {
            Phase::Initializing => {
                self.render_initializing(ctx);
                ctx.request_repaint_after(INIT_POLL);
                return;
            }
            Phase::Failed(message) => {
                self.render_init_error(ctx, message);
                return;
            }
            Phase::Ready(_) => {}
        }

        let mut actions = Vec::new();
        self.render_sidebar(ctx, &mut actions);
        self.render_header(ctx, &mut actions);
        self.render_observation_panel(ctx, now, &mut actions);
        self.render_chat(ctx, now, &mut actions);

        for action in actions {
            self.handle_action(ctx, action, now);
        }
    }
}

impl Drop for ArtDemoApp {
    fn drop(&mut self) {
        if let Phase::Ready(client) = &self.phase {
            self.chat.stop_generating(client);
        }
        self.chat.shutdown();
    }
}
