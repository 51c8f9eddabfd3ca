//! Active queue management over a fixed-capacity packet ring.
//!
//! An [`Aqm`] owns one ring and one policy chosen at construction: tail-drop
//! FIFO, RED, WRED, CoDel or PIE. Callers feed it packets through
//! [`Aqm::enqueue`] and drain it through [`Aqm::dequeue`]; every drop decision
//! is taken inside those calls and counted in [`AqmStats`].

pub mod algorithm;
pub mod aqm;
pub mod clock;
pub mod config;
pub mod error;
pub mod packet;
pub mod ring;
mod utils;

pub use algorithm::{AlgorithmKind, AlgorithmStats, Verdict};
pub use aqm::{memory_size, ring_storage_size, Aqm, AqmStats, Dequeued, Tally};
pub use clock::{Clock, InstantClock, ManualClock};
pub use config::{AlgorithmConfig, AqmConfig};
pub use error::{ConfigError, Error, Result};
pub use packet::{Packet, StdPacket};
