//! # Strip Control Library for networked LED strip controllers
//!
//! `strip-control-lib` is a Rust library for controlling the small WiFi RGB/RGBWW LED strip
//! controllers that speak a binary protocol on TCP port 5577. It provides a set of APIs to
//! discover controllers on the local network, query their state, switch them on and off, set
//! colors and start built-in or custom effects.
//!
//! ## Features
//!
//! - Device discovery via UDP broadcast
//! - Checksummed packet encoding and decoding
//! - A persistent connection with a background reader that routes responses to waiting callers
//! - Automatic reconnection and retry on socket failures
//!
//! ## Example
//!
//! Here is a simple example of how to use the library to discover controllers and print
//! their state:
//!
//! ```no_run
//! use strip_control_lib::control_interface::ControlInterface;
//! use strip_control_lib::util::discovery::Discovery;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = Discovery::find_devices(Duration::from_secs(1)).await?;
//!
//!     for device in devices {
//!         let interface = ControlInterface::from_device_descriptor(&device);
//!         let status = interface.get_status().await?;
//!         println!("{}: on={} color={:?}", device, status.is_on(), status.rgbww());
//!         interface.disconnect().await;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache License, Version 2.0.
//! You may choose to use either license, depending on your project needs.

// The `control_interface` module talks to a single controller. It owns the TCP connection,
// the background reader and the registry that hands responses to waiting requests.
//
// Example usage:
//
// ```
// use strip_control_lib::control_interface::ControlInterface;
//
// #[tokio::main]
// async fn main() {
//     let control = ControlInterface::new("192.168.1.100", 5577);
//     control.turn_on().await.unwrap();
// }
// ```
pub mod control_interface;

// A `ControlInterface` plus a cache of the last known device state.
pub mod controller;

pub mod error;

// Color values, built-in effects and transition types.
pub mod led;

// Request and response frames of the wire protocol.
pub mod packet;

// Device discovery and the frame codec trait.
pub mod util;

pub use error::{Error, Result};
