// backing memory behind the cache

use std::collections::HashMap;

use log::{debug, trace};

use crate::commons::{Addr, AddrRange, MemoryConfig, Tick};
use crate::event_q::Schedule;
use crate::packet::Packet;

#[derive(Debug)]
pub enum MemEvent {
    Complete(Packet),
}

/// What memory can do to the component above it.
pub trait MemEnv: Schedule<MemEvent> {
    fn send_timing_resp(&mut self, pkt: Packet);
    fn send_retry_req(&mut self);
    fn send_range_change(&mut self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemStats {
    pub reads: u64,
    pub writes: u64,
    pub writebacks: u64,
    pub refused: u64,
}

/// Flat memory with a fixed latency. Bytes never written read back as the
/// low byte of their address.
pub struct SimpleMemory {
    range: AddrRange,
    latency: Tick,
    max_outstanding: usize,
    outstanding: usize,
    need_retry: bool,
    bytes: HashMap<Addr, u8>,
    stats: MemStats,
}

impl SimpleMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        SimpleMemory {
            range: config.range,
            latency: config.latency,
            max_outstanding: config.max_outstanding,
            outstanding: 0,
            need_retry: false,
            bytes: HashMap::new(),
            stats: MemStats::default(),
        }
    }

    pub fn stats(&self) -> &MemStats { &self.stats }
    pub fn outstanding(&self) -> usize { self.outstanding }

    pub fn addr_ranges(&self) -> Vec<AddrRange> {
        vec![self.range]
    }

    pub fn set_range(&mut self, range: AddrRange, env: &mut impl MemEnv) {
        debug!("memory range now {:#x}..{:#x}", range.start, range.end);
        self.range = range;
        env.send_range_change();
    }

    pub fn peek(&self, addr: Addr) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or((addr & 0xff) as u8)
    }

    fn access(&mut self, pkt: &mut Packet) {
        let end = pkt.addr() + pkt.size() as Addr;
        assert!(
            self.range.contains(pkt.addr()) && end <= self.range.end,
            "access {} outside memory range {:#x}..{:#x}", pkt, self.range.start, self.range.end
        );
        if pkt.is_write() {
            for (i, b) in pkt.data().iter().enumerate() {
                self.bytes.insert(pkt.addr() + i as Addr, *b);
            }
        } else if pkt.is_read() {
            let base = pkt.addr();
            let data: Vec<u8> = (0..pkt.size() as Addr).map(|i| self.peek(base + i)).collect();
            pkt.data_mut().copy_from_slice(&data);
        } else {
            panic!("memory cannot handle {:?}", pkt.cmd());
        }
    }

    pub fn recv_functional(&mut self, pkt: &mut Packet) {
        self.access(pkt);
        if pkt.needs_response() {
            pkt.make_response();
        }
    }

    pub fn recv_timing_req(&mut self, pkt: Packet, sched: &mut impl Schedule<MemEvent>) -> Result<(), Packet> {
        if self.max_outstanding > 0 && self.outstanding >= self.max_outstanding {
            trace!("memory busy, refusing {}", pkt);
            self.stats.refused += 1;
            self.need_retry = true;
            return Err(pkt);
        }
        trace!("memory accepted {}", pkt);
        self.outstanding += 1;
        sched.schedule_in(self.latency, MemEvent::Complete(pkt));
        Ok(())
    }

    pub fn process(&mut self, ev: MemEvent, env: &mut impl MemEnv) {
        match ev {
            MemEvent::Complete(mut pkt) => {
                self.access(&mut pkt);
                self.outstanding -= 1;
                match pkt.cmd() {
                    c if c.is_read() => self.stats.reads += 1,
                    c if c.needs_response() => self.stats.writes += 1,
                    _ => self.stats.writebacks += 1,
                }
                if pkt.needs_response() {
                    pkt.make_response();
                    env.send_timing_resp(pkt);
                }
                if self.need_retry {
                    self.need_retry = false;
                    env.send_retry_req();
                }
            }
        }
    }
}
