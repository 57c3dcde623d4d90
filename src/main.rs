mod app;
mod art;
mod chat;
mod client;
mod config;
mod conversation;
mod event;
mod observation;
mod subscription;
mod theme;
mod ui;

use app::ArtDemoApp;
use client::ArtClient;
use config::{AppConfig, DEFAULT_LOG_LEVEL};
use eframe::egui;
use event::{AppEvent, EventSender};
use std::sync::mpsc;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(&config);

    let (tx, rx) = mpsc::channel();
    let events = EventSender::new(tx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("art-runtime")
        .build()?;

    let init_events = events.clone();
    runtime.spawn(async move {
        let result = art::acquire(&config)
            .map(|art| {
                ArtClient::new(
                    art,
                    config.default_thread_config(),
                    init_events.clone(),
                    Handle::current(),
                )
            })
            .map_err(|err| err.to_string());
        init_events.send(AppEvent::Initialized(result));
    });
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    info!("starting ART chat demo");
    eframe::run_native(
        "ART Chat Demo",
        native_options,
        Box::new(move |creation_context| {
            events.attach(creation_context.egui_ctx.clone());
            Ok(Box::new(ArtDemoApp::new(rx, &creation_context.egui_ctx)))
        }),
    )?;

    Ok(())
}
