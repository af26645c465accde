pub mod cache;
pub mod commons;
pub mod event_q;
pub mod memory;
pub mod packet;
pub mod port;
pub mod processor;
pub mod sim;
pub mod stats;
pub mod store;
pub mod utils;

#[cfg(test)]
mod mock;

pub use cache::{CacheEvent, SimpleCache};
pub use commons::{Addr, AddrRange, CacheConfig, ConfigError, MemoryConfig, SystemConfig, Tick};
pub use packet::{MemCmd, Packet};
pub use processor::{Instr, Insts, Processor};
pub use sim::{SimReport, System};
