// src/types.rs
use serde::{Deserialize, Serialize};

use crate::drivers::{PortSelection, Sample, SessionState, StorePolicy};

// 连接模式
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    #[default]
    Hardware,
    Simulation,
}

/// Where and how the next capture session connects.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectTarget {
    pub mode: ConnectionMode,
    pub port: PortSelection,
    pub baud_rate: u32,
}

// GUI 发给后台的命令
#[derive(Clone, Debug)]
pub enum GuiCommand {
    StartCapture(ConnectTarget),
    StopCapture,
    Save(String),
    ExportPlot(String),
    Clear,
    SetStorePolicy(StorePolicy),
    Shutdown,
}

// 后台发给 GUI 的消息
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    State(SessionState),
    Sample(Sample),
    // store was emptied; plot buffers must follow
    Cleared,
    Saved { path: String, rows: usize },
    // totals of the store once a session ends
    Stopped { samples: usize, duration: f64 },
}
