//! Phone side of the protocol: link parsing, the client state machine and its runner.

pub mod client;
pub mod path;
pub mod runner;

pub use client::{ClientEffect, ClientScreen, JoystickClient};
pub use path::{PathError, PlayerPath};
pub use runner::{JoystickAction, JoystickHandle, JoystickView, spawn_joystick};
