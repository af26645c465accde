// a scripted stand-in for everything around the cache, for unit tests

use crate::cache::{CacheEvent, SimpleCache};
use crate::commons::{Addr, AddrRange, PortId, Tick};
use crate::event_q::{EventQueue, Schedule};
use crate::packet::Packet;
use crate::port::CacheEnv;

use rand::Rng;

pub(crate) struct MockEnv {
    pub q: EventQueue<CacheEvent>,
    pub responses: Vec<(PortId, Packet)>,
    pub retries: Vec<PortId>,
    pub range_changes: Vec<PortId>,
    pub mem_reqs: Vec<Packet>,
    pub functional: Vec<Packet>,
    pub cpu_ready: bool,
    pub mem_ready: bool,
}

impl MockEnv {
    pub fn new() -> Self {
        MockEnv {
            q: EventQueue::new(),
            responses: Vec::new(),
            retries: Vec::new(),
            range_changes: Vec::new(),
            mem_reqs: Vec::new(),
            functional: Vec::new(),
            cpu_ready: true,
            mem_ready: true,
        }
    }

    /// byte memory holds at `addr` before anyone writes it
    pub fn pattern(addr: Addr) -> u8 {
        (addr & 0xff) as u8
    }

    /// Deliver every scheduled event to `cache`, in order.
    pub fn run<R: Rng>(&mut self, cache: &mut SimpleCache<R>) {
        while let Some((_, ev)) = self.q.pop() {
            cache.process(ev, self);
        }
    }

    /// Answer the oldest memory request `delay` ticks from now.
    pub fn answer_mem(&mut self, delay: Tick) {
        let mut pkt = self.mem_reqs.remove(0);
        if pkt.is_read() {
            let base = pkt.addr();
            for (i, b) in pkt.data_mut().iter_mut().enumerate() {
                *b = Self::pattern(base + i as Addr);
            }
        }
        pkt.make_response();
        self.q.schedule_in(delay, CacheEvent::TimingResp(pkt));
    }
}

impl Schedule<CacheEvent> for MockEnv {
    fn cur_tick(&self) -> Tick {
        self.q.now()
    }
    fn schedule_at(&mut self, when: Tick, ev: CacheEvent) {
        self.q.push(when, ev);
    }
}

impl CacheEnv for MockEnv {
    fn send_timing_resp(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet> {
        if !self.cpu_ready {
            return Err(pkt);
        }
        self.responses.push((port, pkt));
        Ok(())
    }
    fn send_retry_req(&mut self, port: PortId) {
        self.retries.push(port);
    }
    fn send_range_change(&mut self, port: PortId) {
        self.range_changes.push(port);
    }
    fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet> {
        if !self.mem_ready {
            return Err(pkt);
        }
        self.mem_reqs.push(pkt);
        Ok(())
    }
    fn send_functional(&mut self, pkt: &mut Packet) {
        if pkt.is_read() {
            let base = pkt.addr();
            for (i, b) in pkt.data_mut().iter_mut().enumerate() {
                *b = Self::pattern(base + i as Addr);
            }
        }
        self.functional.push(pkt.clone());
        pkt.make_response();
    }
    fn mem_addr_ranges(&self) -> Vec<AddrRange> {
        vec![AddrRange::new(0, 1 << 20)]
    }
}
