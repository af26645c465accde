// Wires processors, the cache and memory together around one event queue.
//
// Components never hold references to each other. Every synchronous call
// across a port (a timing send and its accept/refuse answer) goes through a
// short-lived link built here, which borrows only the components the callee
// needs. Everything else, retries included, travels as an event.

use log::info;

use crate::cache::{CacheEvent, SimpleCache};
use crate::commons::{AddrRange, ConfigError, PortId, SystemConfig, Tick};
use crate::event_q::{EventQueue, Schedule};
use crate::memory::{MemEnv, MemEvent, SimpleMemory};
use crate::packet::Packet;
use crate::port::CacheEnv;
use crate::processor::{Completion, Insts, ProcEnv, ProcEvent, Processor};
use crate::stats::CacheStats;

#[derive(Debug)]
pub enum Event {
    Cache(CacheEvent),
    Memory(MemEvent),
    Processor(usize, ProcEvent),
}

type Queue = EventQueue<Event>;

// links

struct CacheSched<'a>(&'a mut Queue);

impl Schedule<CacheEvent> for CacheSched<'_> {
    fn cur_tick(&self) -> Tick { self.0.now() }
    fn schedule_at(&mut self, when: Tick, ev: CacheEvent) { self.0.push(when, Event::Cache(ev)) }
}

struct ProcSched<'a> {
    id: usize,
    queue: &'a mut Queue,
}

impl Schedule<ProcEvent> for ProcSched<'_> {
    fn cur_tick(&self) -> Tick { self.queue.now() }
    fn schedule_at(&mut self, when: Tick, ev: ProcEvent) { self.queue.push(when, Event::Processor(self.id, ev)) }
}

struct MemLink<'a>(&'a mut Queue);

impl Schedule<MemEvent> for MemLink<'_> {
    fn cur_tick(&self) -> Tick { self.0.now() }
    fn schedule_at(&mut self, when: Tick, ev: MemEvent) { self.0.push(when, Event::Memory(ev)) }
}

impl MemEnv for MemLink<'_> {
    fn send_timing_resp(&mut self, pkt: Packet) {
        let now = self.0.now();
        self.0.push(now, Event::Cache(CacheEvent::TimingResp(pkt)));
    }
    fn send_retry_req(&mut self) {
        let now = self.0.now();
        self.0.push(now, Event::Cache(CacheEvent::ReqRetry));
    }
    fn send_range_change(&mut self) {
        let now = self.0.now();
        self.0.push(now, Event::Cache(CacheEvent::RangeChange));
    }
}

struct CacheLink<'a> {
    queue: &'a mut Queue,
    memory: &'a mut SimpleMemory,
    procs: &'a mut [Processor],
}

impl Schedule<CacheEvent> for CacheLink<'_> {
    fn cur_tick(&self) -> Tick { self.queue.now() }
    fn schedule_at(&mut self, when: Tick, ev: CacheEvent) { self.queue.push(when, Event::Cache(ev)) }
}

impl CacheEnv for CacheLink<'_> {
    fn send_timing_resp(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet> {
        let mut sched = ProcSched { id: port, queue: &mut *self.queue };
        self.procs[port].recv_timing_resp(pkt, &mut sched)
    }
    fn send_retry_req(&mut self, port: PortId) {
        let now = self.queue.now();
        self.queue.push(now, Event::Processor(port, ProcEvent::RetryReq));
    }
    fn send_range_change(&mut self, port: PortId) {
        self.procs[port].recv_range_change();
    }
    fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.memory.recv_timing_req(pkt, &mut MemLink(&mut *self.queue))
    }
    fn send_functional(&mut self, pkt: &mut Packet) {
        self.memory.recv_functional(pkt);
    }
    fn mem_addr_ranges(&self) -> Vec<AddrRange> {
        self.memory.addr_ranges()
    }
}

struct ProcLink<'a> {
    id: usize,
    queue: &'a mut Queue,
    cache: &'a mut SimpleCache,
}

impl Schedule<ProcEvent> for ProcLink<'_> {
    fn cur_tick(&self) -> Tick { self.queue.now() }
    fn schedule_at(&mut self, when: Tick, ev: ProcEvent) { self.queue.push(when, Event::Processor(self.id, ev)) }
}

impl ProcEnv for ProcLink<'_> {
    fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.cache.recv_timing_req(self.id, pkt, &mut CacheSched(&mut *self.queue))
    }
    fn send_resp_retry(&mut self) {
        let now = self.queue.now();
        self.queue.push(now, Event::Cache(CacheEvent::RespRetry(self.id)));
    }
}

// system

#[derive(Clone, Debug)]
pub struct SimReport {
    pub ticks: Tick,
    pub all_done: bool,
    /// per processor, in port order
    pub completions: Vec<Vec<Completion>>,
    pub cache: CacheStats,
}

pub struct System {
    queue: Queue,
    cache: SimpleCache,
    memory: SimpleMemory,
    procs: Vec<Processor>,
}

impl System {
    /// One processor per cpu-side port, in port order.
    pub fn new(config: &SystemConfig, procs: Vec<Processor>) -> Result<Self, ConfigError> {
        config.validate()?;
        if procs.len() != config.cache.num_cpu_ports {
            return Err(ConfigError::PortMismatch {
                programs: procs.len(),
                ports: config.cache.num_cpu_ports,
            });
        }
        let mut queue = Queue::new();
        for i in 0..procs.len() {
            queue.push(0, Event::Processor(i, ProcEvent::Tick));
        }
        Ok(System {
            queue,
            cache: SimpleCache::new(&config.cache)?,
            memory: SimpleMemory::new(&config.memory),
            procs,
        })
    }

    pub fn from_programs(config: &SystemConfig, programs: Vec<Insts>) -> Result<Self, ConfigError> {
        let procs = programs
            .into_iter()
            .enumerate()
            .map(|(i, insts)| Processor::new(i as u32, insts))
            .collect();
        Self::new(config, procs)
    }

    pub fn cache(&self) -> &SimpleCache { &self.cache }
    pub fn memory(&self) -> &SimpleMemory { &self.memory }
    pub fn procs(&self) -> &[Processor] { &self.procs }
    pub fn now(&self) -> Tick { self.queue.now() }

    fn cache_link(&mut self) -> (&mut SimpleCache, CacheLink<'_>) {
        let link = CacheLink {
            queue: &mut self.queue,
            memory: &mut self.memory,
            procs: &mut self.procs,
        };
        (&mut self.cache, link)
    }

    fn dispatch(&mut self, ev: Event) {
        match ev {
            Event::Cache(ev) => {
                let (cache, mut link) = self.cache_link();
                cache.process(ev, &mut link);
            }
            Event::Memory(ev) => self.memory.process(ev, &mut MemLink(&mut self.queue)),
            Event::Processor(id, ev) => {
                let mut link = ProcLink { id, queue: &mut self.queue, cache: &mut self.cache };
                self.procs[id].process(ev, &mut link);
            }
        }
    }

    /// Deliver events until none are left or the next one lies past `limit`.
    pub fn run(&mut self, limit: Option<Tick>) -> SimReport {
        while let Some(t) = self.queue.peek_tick() {
            if matches!(limit, Some(l) if t > l) {
                break;
            }
            if let Some((_, ev)) = self.queue.pop() {
                self.dispatch(ev);
            }
        }
        let all_done = self.procs.iter().all(Processor::is_done);
        info!("simulation stopped at tick {}, all done: {}", self.now(), all_done);
        SimReport {
            ticks: self.now(),
            all_done,
            completions: self.procs.iter().map(|p| p.completions().to_vec()).collect(),
            cache: self.cache.stats().clone(),
        }
    }

    /// Untimed access through the cache, as a debugger or loader would do.
    pub fn functional(&mut self, pkt: &mut Packet) {
        let (cache, mut link) = self.cache_link();
        cache.recv_functional(pkt, &mut link);
    }

    pub fn addr_ranges(&mut self) -> Vec<AddrRange> {
        let (cache, link) = self.cache_link();
        cache.addr_ranges(&link)
    }

    /// Move memory to `range`; processors hear about it once the queue runs.
    pub fn set_memory_range(&mut self, range: AddrRange) {
        self.memory.set_range(range, &mut MemLink(&mut self.queue));
    }
}
