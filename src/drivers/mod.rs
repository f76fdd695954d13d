// src/drivers/mod.rs
// Capture core: parse lines, buffer samples, run the session state machine.
pub mod acquisition;
pub mod buffer;
pub mod error;
pub mod parser;
pub mod plot;
pub mod source;

pub use acquisition::{Acquisition, PollOutcome, SessionState, StorePolicy};
pub use buffer::Sample;
pub use error::SaveError;
pub use plot::{export_capture_png, PlotStyle};
pub use source::{list_ports, Connector, PortSelection, SerialConnector, SimulatedConnector};
