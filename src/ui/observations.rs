use crate::observation::{pretty, Observation, ObservationData, ToolCallRecord};
use crate::theme::Theme;
use crate::ui::clipboard::CopyFeedback;
use eframe::egui::{self, RichText};
use serde_json::Value;
use std::time::Instant;

/// Clipboard text requested by a card button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest(pub String);

pub fn render_observations(
    ui: &mut egui::Ui,
    theme: &Theme,
    observations: &[Observation],
    feedback: &CopyFeedback,
    now: Instant,
    emit: &mut dyn FnMut(CopyRequest),
) {
    ui.heading("Observations");
    ui.label(
        RichText::new(format!("{} events for this turn", observations.len()))
            .color(theme.text_muted)
            .size(12.0),
    );
    ui.add_space(theme.spacing_8);

    egui::ScrollArea::vertical()
        .id_salt("observation_cards")
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for observation in observations {
                ui.push_id(observation.id.as_str(), |ui| {
                    render_card(ui, theme, observation, feedback, now, emit);
                });
                ui.add_space(theme.spacing_8);
            }
        });
}

fn copy_button(
    ui: &mut egui::Ui,
    theme: &Theme,
    label: &str,
    payload: String,
    feedback: &CopyFeedback,
    now: Instant,
    emit: &mut dyn FnMut(CopyRequest),
) {
    let copied = feedback.is_payload_copied(&payload, now);
    let text = if copied { "Copied" } else { label };
    let button = egui::Button::new(RichText::new(text).size(12.0))
        .stroke(theme.subtle_button_stroke())
        .small();
    if ui.add(button).clicked() {
        emit(CopyRequest(payload));
    }
}

fn render_card(
    ui: &mut egui::Ui,
    theme: &Theme,
    observation: &Observation,
    feedback: &CopyFeedback,
    now: Instant,
    emit: &mut dyn FnMut(CopyRequest),
) {
    let kind = observation.kind();
    theme.card_frame(kind).show(ui, |ui| {
        ui.set_width(ui.available_width());
        ui.horizontal(|ui| {
            ui.label(
                RichText::new(kind.label())
                    .color(theme.category_color(kind))
                    .strong(),
            );
            if let Some(timestamp) = &observation.timestamp {
                ui.label(RichText::new(timestamp).color(theme.text_muted).size(12.0));
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                copy_button(
                    ui,
                    theme,
                    "Copy",
                    observation.data.copy_payload(),
                    feedback,
                    now,
                    emit,
                );
            });
        });
        ui.add_space(theme.spacing_4);

        match &observation.data {
            ObservationData::Intent { intent } => {
                ui.label(RichText::new(intent).color(theme.text_primary));
            }
            ObservationData::Plan { plan, raw_output } => {
                ui.label(RichText::new(plan).color(theme.text_primary));
                if !raw_output.is_empty() && raw_output != plan {
                    egui::CollapsingHeader::new("Raw output")
                        .default_open(false)
                        .show(ui, |ui| {
                            ui.label(RichText::new(raw_output).monospace().size(12.0));
                        });
                }
            }
            ObservationData::ToolCall { calls } => {
                if calls.is_empty() {
                    ui.label(RichText::new("No tool calls").color(theme.text_muted));
                }
                for call in calls {
                    render_tool_call(ui, theme, call);
                }
            }
            ObservationData::ToolExecution {
                call_id,
                tool_name,
                status,
                output,
            } => {
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new(tool_name.as_deref().unwrap_or("tool"))
                            .color(theme.text_primary)
                            .strong(),
                    );
                    ui.label(
                        RichText::new(status.as_str())
                            .color(theme.status_color(*status))
                            .size(12.0),
                    );
                    if let Some(call_id) = call_id {
                        ui.label(
                            RichText::new(format!("call {call_id}"))
                                .color(theme.text_muted)
                                .size(12.0),
                        );
                    }
                });
                ui.horizontal(|ui| {
                    ui.label(RichText::new("Output").color(theme.text_muted).size(12.0));
                    copy_button(
                        ui,
                        theme,
                        "Copy output",
                        output_text(output),
                        feedback,
                        now,
                        emit,
                    );
                });
                ui.label(RichText::new(output_text(output)).monospace().size(12.0));
            }
            ObservationData::Synthesis { text } => {
                ui.label(RichText::new(text).color(theme.text_primary));
            }
            ObservationData::Error { message, details } => {
                ui.label(RichText::new(message).color(theme.danger));
                if !details.is_null() {
                    egui::CollapsingHeader::new("Details")
                        .default_open(false)
                        .show(ui, |ui| {
                            ui.label(RichText::new(pretty(details)).monospace().size(12.0));
                        });
                }
            }
        }
    });
}

fn render_tool_call(ui: &mut egui::Ui, theme: &Theme, call: &ToolCallRecord) {
    egui::Frame::new()
        .fill(theme.surface_3)
        .corner_radius(egui::CornerRadius::same(theme.radius_8))
        .inner_margin(egui::Margin::symmetric(
            theme.spacing_8 as i8,
            theme.spacing_4 as i8,
        ))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new(&call.tool_name).strong());
                ui.label(
                    RichText::new(format!("call {}", call.call_id))
                        .color(theme.text_muted)
                        .size(12.0),
                );
            });
            ui.label(
                RichText::new(pretty(&Value::Object(call.arguments.clone())))
                    .monospace()
                    .size(12.0),
            );
        });
}

/// Plain strings are shown as-is, everything else as pretty JSON.
pub fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => pretty(other),
    }
}
