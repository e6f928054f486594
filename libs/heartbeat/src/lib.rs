//! Heartbeat protocol: the wire record, the producer-side throttle and
//! the consumer-side liveness monitor.

pub mod codec;
pub mod emitter;
pub mod monitor;

pub use codec::{decode, encode, heartbeat_file_path, write_heartbeat_file, HeartbeatRecord};
pub use emitter::{HeartbeatEmitter, HeartbeatPolicy};
pub use monitor::{Filtered, HeartbeatMonitor, Liveness};
