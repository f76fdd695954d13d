// src/engine.rs
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::drivers::{
    export_capture_png, Acquisition, Connector, PlotStyle, PollOutcome, SerialConnector,
    SimulatedConnector, StorePolicy,
};
use crate::recorder;
use crate::types::*;

const IDLE_SLEEP: Duration = Duration::from_millis(50);
const MAX_COMMANDS_PER_CYCLE: usize = 10;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub store_policy: StorePolicy,
}

pub type ConnectorFactory = Box<dyn Fn(&ConnectTarget) -> Box<dyn Connector> + Send>;

/// Builds the connector for a real or simulated device.
pub fn default_factory(config: &EngineConfig) -> ConnectorFactory {
    let read_timeout = config.read_timeout;
    let line_interval = config.poll_interval;
    Box::new(move |target: &ConnectTarget| -> Box<dyn Connector> {
        match target.mode {
            ConnectionMode::Hardware => Box::new(SerialConnector {
                selection: target.port.clone(),
                baud_rate: target.baud_rate,
                read_timeout,
            }),
            ConnectionMode::Simulation => Box::new(SimulatedConnector { line_interval }),
        }
    })
}

pub fn spawn_thread(
    tx: Sender<EngineMessage>,
    rx_cmd: Receiver<GuiCommand>,
    config: EngineConfig,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let factory = default_factory(&config);
        let mut engine = Engine::new(tx, config, factory);
        engine.run(rx_cmd);
        log::debug!("engine thread exited");
    })
}

/// Owns the acquisition session; the GUI only ever sees copies of samples.
pub struct Engine {
    tx: Sender<EngineMessage>,
    acquisition: Acquisition,
    config: EngineConfig,
    factory: ConnectorFactory,
}

impl Engine {
    pub fn new(tx: Sender<EngineMessage>, config: EngineConfig, factory: ConnectorFactory) -> Self {
        Self {
            tx,
            acquisition: Acquisition::new(config.store_policy),
            config,
            factory,
        }
    }

    pub fn run(&mut self, rx_cmd: Receiver<GuiCommand>) {
        self.log("Engine ready.");
        loop {
            for _ in 0..MAX_COMMANDS_PER_CYCLE {
                match rx_cmd.try_recv() {
                    Ok(cmd) => {
                        if !self.handle(cmd) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.acquisition.stop();
                        return;
                    }
                }
            }
            if self.acquisition.is_running() {
                self.tick();
                thread::sleep(self.config.poll_interval);
            } else {
                thread::sleep(IDLE_SLEEP);
            }
        }
    }

    /// One poll of the connection. New samples are forwarded to the GUI.
    pub fn tick(&mut self) {
        if let PollOutcome::Recorded(sample) = self.acquisition.poll_once() {
            self.tx.send(EngineMessage::Sample(sample)).ok();
        }
    }

    /// Returns `false` once the engine should exit.
    pub fn handle(&mut self, cmd: GuiCommand) -> bool {
        match cmd {
            GuiCommand::StartCapture(target) => self.start(&target),
            GuiCommand::StopCapture => {
                let was_running = self.acquisition.is_running();
                self.acquisition.stop();
                if was_running {
                    let store = self.acquisition.store();
                    let (samples, duration) = (store.len(), store.duration_seconds());
                    self.tx.send(EngineMessage::Stopped { samples, duration }).ok();
                    self.log(&format!(
                        "🛑 Capture stopped ({samples} samples, {duration:.1} s)"
                    ));
                }
                self.send_state();
            }
            GuiCommand::Save(base) => self.save(&base),
            GuiCommand::ExportPlot(base) => {
                self.export_plot(&base);
            }
            GuiCommand::Clear => {
                if self.acquisition.clear() {
                    self.tx.send(EngineMessage::Cleared).ok();
                    self.log("Samples cleared");
                } else {
                    self.log("Stop the capture before clearing");
                }
            }
            GuiCommand::SetStorePolicy(policy) => {
                log::info!("Store policy set to {policy:?}");
                self.acquisition.set_policy(policy);
            }
            GuiCommand::Shutdown => {
                self.acquisition.stop();
                return false;
            }
        }
        true
    }

    fn start(&mut self, target: &ConnectTarget) {
        if self.acquisition.is_running() {
            self.log("Capture already running");
            return;
        }
        let connector = (self.factory)(target);
        let previous = self.acquisition.store().len();
        match self.acquisition.start(connector.as_ref()) {
            Ok(()) => {
                if self.acquisition.store().len() < previous {
                    self.tx.send(EngineMessage::Cleared).ok();
                }
                let name = self.acquisition.source_name().unwrap_or("?").to_owned();
                self.log(&format!("✅ Capture started on {name}"));
            }
            Err(e) => {
                log::error!("Start failed: {e}");
                self.log(&format!("❌ Could not open serial port: {e}"));
            }
        }
        self.send_state();
    }

    fn save(&mut self, base: &str) {
        let path = recorder::output_path(base);
        match self.acquisition.save(&path) {
            Ok(rows) => {
                self.tx
                    .send(EngineMessage::Saved {
                        path: path.display().to_string(),
                        rows,
                    })
                    .ok();
                self.log(&format!("💾 Saved {rows} samples to {}", path.display()));
            }
            Err(e) if e.is_warning() => self.log(&format!("⚠ {e}")),
            Err(e) => {
                log::error!("Save failed: {e}");
                self.log(&format!("❌ {e}"));
            }
        }
    }

    /// Renders on its own thread so polling is not held up by a large capture.
    fn export_plot(&mut self, base: &str) -> JoinHandle<()> {
        let path = PathBuf::from(format!("{}.png", base.trim()));
        let samples = self.acquisition.store().snapshot();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let msg = match export_capture_png(&samples, &PlotStyle::default(), &path) {
                Ok(()) => format!("🖼 Plot exported to {}", path.display()),
                Err(e) => {
                    log::error!("Plot export failed: {e}");
                    format!("❌ {e}")
                }
            };
            tx.send(EngineMessage::Log(msg)).ok();
        })
    }

    fn send_state(&self) {
        self.tx
            .send(EngineMessage::State(self.acquisition.state()))
            .ok();
    }

    fn log(&self, msg: &str) {
        self.tx.send(EngineMessage::Log(msg.to_owned())).ok();
    }
}
