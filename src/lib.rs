//! ICMP Echo probing over raw sockets with streaming latency statistics.

pub mod config;
pub mod error;
pub mod icmp;
pub mod observer;
pub mod pinger;
pub mod privilege;
pub mod probe;
pub mod socket;
pub mod stats;

pub use config::PingerConfig;
pub use error::{ConfigError, MalformedMessage, ProbeError, TransportError};
pub use observer::{LogObserver, NoopObserver, Observer};
pub use pinger::{Pinger, State};
pub use probe::{ProbeEvent, ProbeResult, Prober};
pub use stats::{Accumulator, Statistics};
