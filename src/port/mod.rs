//! Transport abstraction layer for the scale link.
//!
//! Provides the `ScaleTransport` trait plus a scripted mock and a real
//! tokio-serial implementation, enabling dependency injection and testing.

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(feature = "async-serial")]
pub mod async_port;

pub use error::PortError;
pub use mock::{MockChunk, MockTransport};
pub use traits::*;

#[cfg(feature = "async-serial")]
pub use async_port::{PortSelection, SerialPortTransport};
