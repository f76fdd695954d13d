// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod config;
mod drivers;
mod engine;
mod gui;
mod recorder;
mod types;

use eframe::egui;

use crate::config::Settings;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings_path = Settings::default_path();
    let settings = Settings::load_or_default(&settings_path);
    log::info!(
        "Settings: port {:?} at {} baud, mode {:?}",
        settings.port,
        settings.baud_rate,
        settings.mode
    );

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1200.0, 700.0])
        .with_min_inner_size([800.0, 480.0])
        .with_title("VoltCap");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "VoltCap",
        options,
        Box::new(move |_cc| Box::new(gui::VoltCapApp::new(settings, settings_path))),
    )
}
