//! gazmodem-sim - simulated PLUM/GazModem bus
//!
//! Emulates a transparent RS485-to-TCP bridge with devices behind it, for
//! developing and testing the scanner without hardware.
//!
//! # Modules
//!
//! - [`device`] - devices and their parameter tables
//! - [`bus`] - request handling and background traffic
//! - [`server`] - the TCP front end

pub mod bus;
pub mod device;
pub mod server;

pub use bus::SimulatedBus;
pub use device::{SimDevice, SimParameter};
pub use server::{serve, ServerOptions};
