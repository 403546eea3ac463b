pub mod ezo;
pub mod pool_controller;

pub use ezo::{EzoReader, PortOpener, ReadError, SerialLink, SystemPorts};
pub use pool_controller::{ForwardError, PoolController};
