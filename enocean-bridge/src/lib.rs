//! enocean-bridge: talk to an EnOcean gateway module over serial or TCP.
//!
//! The [`Communicator`] owns a [`Transport`](transport::Transport), decodes
//! incoming frames on a reader thread and serializes outgoing packets. The
//! [`Dispatcher`] routes radio telegrams to configured [`devices`].

pub mod communicator;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod logging;
pub mod supervisor;
pub mod transport;

pub use communicator::{drain_packets, Communicator, CommunicatorConfig, CommunicatorError};
pub use config::{load_config, ConfigError, ConfigFile, DeviceConfig, TransportSettings};
pub use dispatch::{Dispatched, Dispatcher};
pub use supervisor::{run_monitor, Backoff};
