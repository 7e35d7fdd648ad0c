//! Client side of the Moonraker host service protocol: HTTP queries,
//! the key/value database, and the websocket notification format.

pub mod client;
pub mod error;
pub mod notification;

pub use client::{MoonrakerClient, ServerInfo};
pub use error::MoonrakerError;
pub use notification::{
    Frame, KlipperState, LivePosition, MotionReport, Section, SubscribeRequest, Toolhead,
};

pub const KLIPPY_READY: &str = "ready";
pub const ACTIVE_STATE_INACTIVE: &str = "inactive";
