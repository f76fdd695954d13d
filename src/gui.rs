// src/gui.rs
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotBounds, PlotPoints};

use crate::config::Settings;
use crate::drivers::{list_ports, PortSelection, Sample, SessionState, StorePolicy};
use crate::engine::{self, EngineConfig};
use crate::types::*;

const RAW_COLOR: Color32 = Color32::from_rgb(31, 119, 180);
const FILTERED_COLOR: Color32 = Color32::from_rgb(255, 127, 14);
const MAX_LOG_LINES: usize = 8;
// cap per frame so a backlog can't freeze the UI
const MAX_MESSAGES_PER_FRAME: usize = 2000;
// per series, per frame
const MAX_PLOT_POINTS: usize = 20_000;

pub struct VoltCapApp {
    settings: Settings,
    settings_path: PathBuf,

    // 会话状态
    state: SessionState,
    sample_count: usize,
    last_sample: Option<Sample>,
    // (samples, seconds) held by the engine after the last stop
    stored: Option<(usize, f64)>,

    // 绘图数据
    raw_points: Vec<[f64; 2]>,
    filtered_points: Vec<[f64; 2]>,
    follow_latest: bool,
    view_seconds: f64,

    // 端口管理
    available_ports: Vec<String>,
    fixed_port: String,

    log_messages: Vec<String>,

    rx: Receiver<EngineMessage>,
    tx_cmd: Sender<GuiCommand>,
    engine: Option<JoinHandle<()>>,
}

impl VoltCapApp {
    pub fn new(settings: Settings, settings_path: PathBuf) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let engine = engine::spawn_thread(
            tx,
            rx_cmd,
            EngineConfig {
                poll_interval: settings.poll_interval(),
                read_timeout: settings.read_timeout(),
                store_policy: settings.store_policy,
            },
        );
        let fixed_port = match &settings.port {
            PortSelection::Fixed(name) => name.clone(),
            PortSelection::Auto => String::new(),
        };
        let mut app = Self {
            settings,
            settings_path,
            state: SessionState::Idle,
            sample_count: 0,
            last_sample: None,
            stored: None,
            raw_points: Vec::new(),
            filtered_points: Vec::new(),
            follow_latest: true,
            view_seconds: 10.0,
            available_ports: Vec::new(),
            fixed_port,
            log_messages: Vec::new(),
            rx,
            tx_cmd,
            engine: Some(engine),
        };
        app.refresh_ports();
        app
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > MAX_LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    fn send(&mut self, cmd: GuiCommand) {
        if self.tx_cmd.send(cmd).is_err() {
            log::error!("engine thread is gone");
            self.log("Engine stopped unexpectedly; restart the application");
        }
    }

    fn persist_settings(&mut self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            log::warn!("{e:#}");
        }
    }

    fn refresh_ports(&mut self) {
        match list_ports() {
            Ok(ports) => self.available_ports = ports,
            Err(e) => {
                log::warn!("{e}");
                self.available_ports.clear();
            }
        }
        if self.fixed_port.is_empty() {
            if let Some(first) = self.available_ports.first() {
                self.fixed_port = first.clone();
            }
        }
        let summary = format!("Ports: {:?}", self.available_ports);
        self.log(&summary);
    }

    fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    fn start_capture(&mut self) {
        if let PortSelection::Fixed(_) = self.settings.port {
            self.settings.port = PortSelection::Fixed(self.fixed_port.trim().to_owned());
        }
        self.persist_settings();
        let target = ConnectTarget {
            mode: self.settings.mode,
            port: self.settings.port.clone(),
            baud_rate: self.settings.baud_rate,
        };
        self.send(GuiCommand::StartCapture(target));
    }

    fn clear_plot(&mut self) {
        self.raw_points.clear();
        self.filtered_points.clear();
        self.sample_count = 0;
        self.last_sample = None;
        self.stored = None;
    }

    fn handle_messages(&mut self) {
        for _ in 0..MAX_MESSAGES_PER_FRAME {
            let Ok(msg) = self.rx.try_recv() else { break };
            match msg {
                EngineMessage::Log(s) => self.log(&s),
                EngineMessage::State(s) => self.state = s,
                EngineMessage::Sample(sample) => {
                    self.raw_points.push([sample.timestamp, sample.raw]);
                    self.filtered_points.push([sample.timestamp, sample.filtered]);
                    self.sample_count += 1;
                    self.last_sample = Some(sample);
                }
                EngineMessage::Cleared => self.clear_plot(),
                EngineMessage::Saved { path, rows } => {
                    log::info!("GUI: {rows} rows saved to {path}");
                }
                EngineMessage::Stopped { samples, duration } => {
                    self.stored = Some((samples, duration));
                }
            }
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        ui.add_space(10.0);
        ui.heading("VoltCap");
        ui.label("Serial voltage capture");
        ui.separator();

        let running = self.is_running();
        ui.add_enabled_ui(!running, |ui| {
            let before = (self.settings.mode, self.settings.port.clone());
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.settings.mode, ConnectionMode::Hardware, "REAL");
                ui.selectable_value(&mut self.settings.mode, ConnectionMode::Simulation, "SIM");
            });

            if self.settings.mode == ConnectionMode::Hardware {
                ui.horizontal(|ui| {
                    let mut auto = self.settings.port == PortSelection::Auto;
                    if ui.checkbox(&mut auto, "Auto-detect port").changed() {
                        self.settings.port = if auto {
                            PortSelection::Auto
                        } else {
                            PortSelection::Fixed(self.fixed_port.clone())
                        };
                    }
                });
                if self.settings.port != PortSelection::Auto {
                    ui.horizontal(|ui| {
                        egui::ComboBox::from_id_source("port_selector")
                            .selected_text(&self.fixed_port)
                            .show_ui(ui, |ui| {
                                for p in &self.available_ports {
                                    ui.selectable_value(&mut self.fixed_port, p.clone(), p);
                                }
                            });
                        if ui.button("🔄").on_hover_text("Rescan ports").clicked() {
                            self.refresh_ports();
                        }
                    });
                    ui.text_edit_singleline(&mut self.fixed_port);
                }
                ui.label(format!("{} baud", self.settings.baud_rate));
            }

            let mut fresh = self.settings.store_policy == StorePolicy::FreshPerSession;
            if ui.checkbox(&mut fresh, "Clear samples on each start").changed() {
                self.settings.store_policy = if fresh {
                    StorePolicy::FreshPerSession
                } else {
                    StorePolicy::Accumulate
                };
                self.send(GuiCommand::SetStorePolicy(self.settings.store_policy));
                self.persist_settings();
            }
            if before != (self.settings.mode, self.settings.port.clone()) {
                self.persist_settings();
            }
        });

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!running, egui::Button::new("▶ START"))
                .clicked()
            {
                self.start_capture();
            }
            if ui.add_enabled(running, egui::Button::new("⏹ STOP")).clicked() {
                self.send(GuiCommand::StopCapture);
            }
        });

        ui.add_space(20.0);
        ui.separator();
        ui.label("OUTPUT FILE (.txt is added)");
        ui.add_enabled(
            !running,
            egui::TextEdit::singleline(&mut self.settings.output_base),
        );
        ui.horizontal(|ui| {
            if ui.add_enabled(!running, egui::Button::new("💾 SAVE")).clicked() {
                let base = self.settings.output_base.clone();
                self.persist_settings();
                self.send(GuiCommand::Save(base));
            }
            if ui.add_enabled(!running, egui::Button::new("🖼 PNG")).clicked() {
                let base = self.settings.output_base.clone();
                self.send(GuiCommand::ExportPlot(base));
            }
            if ui.add_enabled(!running, egui::Button::new("🗑 CLEAR")).clicked() {
                self.send(GuiCommand::Clear);
            }
        });

        ui.add_space(10.0);
        ui.label(format!("Samples: {}", self.sample_count));
        if let (false, Some((samples, duration))) = (running, self.stored) {
            ui.label(format!("Stored: {samples} samples over {duration:.1} s"));
        }
        if let Some(s) = self.last_sample {
            ui.label(format!("t = {:.2} s", s.timestamp));
            ui.label(
                egui::RichText::new(format!("Raw: {:.3} V", s.raw)).color(RAW_COLOR),
            );
            ui.label(
                egui::RichText::new(format!("Filtered: {:.3} V", s.filtered))
                    .color(FILTERED_COLOR),
            );
        }

        ui.add_space(10.0);
        egui::ScrollArea::vertical().max_height(140.0).show(ui, |ui| {
            for m in &self.log_messages {
                ui.monospace(m);
            }
        });
    }

    fn show_plot(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let status = match self.state {
                SessionState::Idle => "Idle",
                SessionState::Running => "Capturing...",
                SessionState::Stopped => "Stopped",
            };
            ui.label(egui::RichText::new(status).strong());
            ui.checkbox(&mut self.follow_latest, "Follow latest");
            ui.add(
                egui::Slider::new(&mut self.view_seconds, 1.0..=120.0)
                    .text("window (s)")
                    .logarithmic(true),
            );
        });

        let follow = self.follow_latest;
        let window = follow_window(&self.raw_points, &self.filtered_points, self.view_seconds);
        // only the followed window is handed to the plot; otherwise thin the full series
        let (raw, filtered) = match (follow, window) {
            (true, Some((min, _))) => (
                visible_tail(&self.raw_points, min[0]),
                visible_tail(&self.filtered_points, min[0]),
            ),
            _ => (&self.raw_points[..], &self.filtered_points[..]),
        };
        Plot::new("capture_plot")
            .legend(Legend::default())
            .x_axis_label("Time (s)")
            .y_axis_label("Voltage (V)")
            .allow_drag(!follow)
            .allow_zoom(!follow)
            .show(ui, |plot_ui| {
                if !raw.is_empty() {
                    plot_ui.line(
                        Line::new(PlotPoints::from_iter(thinned(raw, MAX_PLOT_POINTS)))
                            .name("Raw voltage")
                            .color(RAW_COLOR),
                    );
                    plot_ui.line(
                        Line::new(PlotPoints::from_iter(thinned(filtered, MAX_PLOT_POINTS)))
                            .name("Filtered voltage")
                            .color(FILTERED_COLOR),
                    );
                }
                if let (true, Some((min, max))) = (follow, window) {
                    plot_ui.set_plot_bounds(PlotBounds::from_min_max(min, max));
                }
            });
    }
}

/// Points from `t_from` on, plus the one before so the line enters from the left edge.
/// Points must be in time order.
fn visible_tail(points: &[[f64; 2]], t_from: f64) -> &[[f64; 2]] {
    let first = points.partition_point(|p| p[0] < t_from);
    &points[first.saturating_sub(1)..]
}

/// Every n-th point so that at most `max` are yielded.
fn thinned(points: &[[f64; 2]], max: usize) -> impl Iterator<Item = [f64; 2]> + '_ {
    let stride = points.len().div_ceil(max.max(1)).max(1);
    points.iter().step_by(stride).copied()
}

/// Bounds covering the last `seconds` of data on both series, padded vertically.
fn follow_window(
    raw: &[[f64; 2]],
    filtered: &[[f64; 2]],
    seconds: f64,
) -> Option<([f64; 2], [f64; 2])> {
    let t_end = raw.last()?[0];
    let t_start = (t_end - seconds).max(0.0);
    let visible = visible_tail(raw, t_start)
        .iter()
        .chain(visible_tail(filtered, t_start))
        .filter(|p| p[0] >= t_start)
        .map(|p| p[1]);
    let (lo, hi) = visible.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let pad = ((hi - lo) * 0.1).max(0.1);
    Some(([t_start, lo - pad], [t_end.max(t_start + 0.1), hi + pad]))
}

impl eframe::App for VoltCapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_messages();

        if self.is_running() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(Duration::from_millis(200));
        }

        egui::SidePanel::left("controls")
            .min_width(260.0)
            .show(ctx, |ui| self.show_controls(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.show_plot(ui));
    }
}

impl Drop for VoltCapApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
        if let Some(handle) = self.engine.take() {
            handle.join().ok();
        }
        self.persist_settings();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_window_tracks_tail() {
        let raw: Vec<[f64; 2]> = (0..=200).map(|i| [i as f64 * 0.1, 1.0]).collect();
        let filtered: Vec<[f64; 2]> = (0..=200).map(|i| [i as f64 * 0.1, 3.0]).collect();
        let (min, max) = follow_window(&raw, &filtered, 5.0).unwrap();
        assert!((min[0] - 15.0).abs() < 1e-9);
        assert!((max[0] - 20.0).abs() < 1e-9);
        assert!(min[1] < 1.0 && max[1] > 3.0);
    }

    #[test]
    fn visible_tail_starts_one_point_before_cutoff() {
        let points: Vec<[f64; 2]> = (0..100).map(|i| [i as f64, 0.0]).collect();
        let tail = visible_tail(&points, 90.5);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0][0], 90.0);
        assert_eq!(visible_tail(&points, -1.0).len(), 100);
        assert!(visible_tail(&points, 1000.0).len() <= 1);
    }

    #[test]
    fn thinned_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..100_001).map(|i| [i as f64, 0.0]).collect();
        let kept: Vec<[f64; 2]> = thinned(&points, 20_000).collect();
        assert!(kept.len() <= 20_000);
        assert!(kept.len() > 10_000);
        assert_eq!(kept[0], points[0]);
        assert_eq!(thinned(&points[..5], 20_000).count(), 5);
    }

    #[test]
    fn follow_window_empty_is_none() {
        assert!(follow_window(&[], &[], 5.0).is_none());
    }

    #[test]
    fn follow_window_single_point_has_width() {
        let (min, max) = follow_window(&[[0.0, 2.0]], &[[0.0, 2.0]], 5.0).unwrap();
        assert!(max[0] > min[0]);
        assert!(max[1] > min[1]);
    }
}
