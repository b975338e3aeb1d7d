pub mod client;
pub mod event;
pub mod protocol;

pub use client::{RconClient, RconConfig, RconError};
pub use event::RconEvent;
