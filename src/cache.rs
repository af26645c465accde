use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::commons::{AddrRange, CacheConfig, ConfigError, PortId, ReqId, Tick};
use crate::event_q::Schedule;
use crate::packet::{MemCmd, Packet};
use crate::port::{CacheEnv, CpuSidePort, MemSidePort};
use crate::stats::CacheStats;
use crate::store::BlockStore;

// events the cache schedules for itself or receives from its peers

#[derive(Debug)]
pub enum CacheEvent {
    AccessTiming(ReqId),        // access latency has passed
    TimingResp(Packet),         // response from memory
    ReqRetry,                   // memory can take the held request again
    RespRetry(PortId),          // requestor can take the held response again
    RangeChange,                // memory's address ranges changed
}

// the one request the cache is working on

enum InFlight {
    Waiting { port: PortId, pkt: Packet },          // accepted, latency not over yet
    Forwarded { port: PortId },                     // missed, the packet itself went to memory
    Upgraded { port: PortId, original: Packet },    // missed, a full-line read went in its place
}

/// A blocking cache with a single outstanding request, random replacement
/// and any number of cpu-side ports sharing one memory-side port.
///
/// The cache is blocked from the moment it accepts a request until it sends
/// the response; requests arriving meanwhile are refused and their port owes
/// the requestor a retry.
pub struct SimpleCache<R = StdRng> {
    latency: u64,
    clock_period: Tick,
    block_size: usize,
    cpu_ports: Vec<CpuSidePort>,
    mem_port: MemSidePort,
    store: BlockStore,
    in_flight: Option<InFlight>,
    miss_time: Tick,
    stats: CacheStats,
    rng: R,
}

impl SimpleCache<StdRng> {
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::seed_from_u64(config.seed))
    }
}

impl<R: Rng> SimpleCache<R> {
    pub fn with_rng(config: &CacheConfig, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(SimpleCache {
            latency: config.latency,
            clock_period: config.clock_period,
            block_size: config.block_size as usize,
            cpu_ports: (0..config.num_cpu_ports).map(CpuSidePort::new).collect(),
            mem_port: MemSidePort::new(),
            store: BlockStore::new(config.block_size as usize, config.capacity()),
            in_flight: None,
            miss_time: 0,
            stats: CacheStats::default(),
            rng,
        })
    }

    pub fn is_blocked(&self) -> bool { self.in_flight.is_some() }
    pub fn stats(&self) -> &CacheStats { &self.stats }
    pub fn store(&self) -> &BlockStore { &self.store }
    pub fn mem_port(&self) -> &MemSidePort { &self.mem_port }
    pub fn cpu_ports(&self) -> &[CpuSidePort] { &self.cpu_ports }

    // cpu side inputs

    /// Timing request on cpu-side port `port`. A refused packet is handed back.
    pub fn recv_timing_req(
        &mut self,
        port: PortId,
        pkt: Packet,
        sched: &mut impl Schedule<CacheEvent>,
    ) -> Result<(), Packet> {
        let when = clock_edge(sched.cur_tick(), self.latency, self.clock_period);
        let in_flight = &mut self.in_flight;
        let cpu_port = self.cpu_ports
            .get_mut(port)
            .unwrap_or_else(|| panic!("no cpu-side port {}", port));
        cpu_port.recv_timing_req(pkt, |pkt| handle_request(in_flight, port, pkt, when, sched))
    }

    /// Untimed access: served from the cache if present, else by memory.
    pub fn recv_functional(&mut self, pkt: &mut Packet, env: &mut impl CacheEnv) {
        if self.store.access_functional(pkt) {
            pkt.make_response();
        } else {
            env.send_functional(pkt);
        }
    }

    pub fn addr_ranges(&self, env: &impl CacheEnv) -> Vec<AddrRange> {
        debug!("sending new ranges");
        env.mem_addr_ranges()
    }

    // mem side input

    pub fn recv_timing_resp(&mut self, pkt: Packet, env: &mut impl CacheEnv) -> bool {
        self.handle_response(pkt, env)
    }

    /// Single entry point for everything delivered through the scheduler.
    pub fn process(&mut self, ev: CacheEvent, env: &mut impl CacheEnv) {
        trace!("cache event {:?} at {}", ev, env.cur_tick());
        match ev {
            CacheEvent::AccessTiming(req_id) => self.access_timing(req_id, env),
            CacheEvent::TimingResp(pkt) => {
                self.recv_timing_resp(pkt, env);
            }
            CacheEvent::ReqRetry => self.mem_port.recv_req_retry(env),
            CacheEvent::RespRetry(port) => self.cpu_ports[port].recv_resp_retry(env),
            CacheEvent::RangeChange => self.send_range_change(env),
        }
    }

    // helper functions

    fn access_timing(&mut self, req_id: ReqId, env: &mut impl CacheEnv) {
        let (port, mut pkt) = match self.in_flight.take() {
            Some(InFlight::Waiting { port, pkt }) => (port, pkt),
            _ => panic!("access for request {} fired while not waiting on it", req_id),
        };
        assert_eq!(pkt.req_id(), req_id, "access fired for the wrong request");

        let hit = self.store.access_functional(&mut pkt);
        debug!("{} for packet: {}", if hit { "Hit" } else { "Miss" }, pkt);

        if hit {
            self.stats.hits += 1;
            pkt.make_response();
            self.send_response(port, pkt, env);
            return;
        }

        self.stats.misses += 1;
        self.miss_time = env.cur_tick();

        // only whole, aligned lines can go to memory as they are
        let bs = self.block_size;
        let addr = pkt.addr();
        let block_addr = pkt.block_addr(bs);
        let size = pkt.size();
        if addr == block_addr && size == bs {
            debug!("forwarding packet");
            self.in_flight = Some(InFlight::Forwarded { port });
            self.mem_port.send_packet(pkt, env);
        } else {
            debug!("upgrading packet to block size");
            assert!(
                (addr - block_addr) as usize + size <= bs,
                "cannot handle accesses that span multiple cache lines ({})", pkt
            );
            // writes fetch the line too and are applied here (write-back, write-allocate)
            let cmd = if pkt.is_write() || pkt.is_read() {
                MemCmd::ReadReq
            } else {
                panic!("unknown packet type {:?} in upgrade size", pkt.cmd());
            };
            assert!(pkt.needs_response());
            let new_pkt = Packet::block_request(&pkt, cmd, bs);
            debug_assert_eq!(new_pkt.addr(), new_pkt.block_addr(bs));
            self.in_flight = Some(InFlight::Upgraded { port, original: pkt });
            debug!("forwarding packet");
            self.mem_port.send_packet(new_pkt, env);
        }
    }

    fn handle_response(&mut self, pkt: Packet, env: &mut impl CacheEnv) -> bool {
        let in_flight = self.in_flight
            .take()
            .unwrap_or_else(|| panic!("got response {} while not blocked", pkt));
        debug!("got response for addr {:#x}", pkt.addr());
        self.insert(&pkt, env);

        self.stats.sample_miss_latency(env.cur_tick() - self.miss_time);

        match in_flight {
            InFlight::Upgraded { port, mut original } => {
                debug!("copying data from new packet to old");
                // only fails if memory answered for a line other than the one asked for
                let hit = self.store.access_functional(&mut original);
                assert!(hit, "should always hit after inserting");
                original.make_response();
                drop(pkt);
                self.send_response(port, original, env);
            }
            InFlight::Forwarded { port } => self.send_response(port, pkt, env),
            InFlight::Waiting { pkt: waiting, .. } => {
                panic!("got response {} before {} was looked up", pkt, waiting)
            }
        }
        true
    }

    fn send_response(&mut self, port: PortId, pkt: Packet, env: &mut impl CacheEnv) {
        debug_assert!(self.in_flight.is_none());
        debug!("sending response for addr {:#x} to port {}", pkt.addr(), port);
        self.cpu_ports[port].send_packet(pkt, env);
        for p in self.cpu_ports.iter_mut() {
            p.try_send_retry(env);
        }
    }

    fn insert(&mut self, pkt: &Packet, env: &mut impl CacheEnv) {
        let bs = self.block_size;
        assert_eq!(pkt.addr(), pkt.block_addr(bs), "inserted packet is not block aligned");
        assert!(!self.store.contains(pkt.addr()), "block {:#x} is already cached", pkt.addr());
        assert!(pkt.is_response(), "only responses are inserted");

        if self.store.is_full() {
            let (addr, data) = self.store.evict_random(&mut self.rng);
            debug!("removing addr {:#x}", addr);
            let wb = Packet::writeback(addr, data);
            debug!("writing packet back {}", wb);
            self.mem_port.send_writeback(wb, env);
        }

        debug!("inserting {}", pkt);
        self.store.insert(pkt.addr(), pkt.data());
    }

    fn send_range_change(&self, env: &mut impl CacheEnv) {
        for p in &self.cpu_ports {
            p.send_range_change(env);
        }
    }
}

/// accept `pkt` unless a request is already in flight
fn handle_request(
    in_flight: &mut Option<InFlight>,
    port: PortId,
    pkt: Packet,
    when: Tick,
    sched: &mut impl Schedule<CacheEvent>,
) -> Result<(), Packet> {
    if in_flight.is_some() {
        return Err(pkt);
    }
    debug!("got request for addr {:#x}", pkt.addr());
    let req_id = pkt.req_id();
    *in_flight = Some(InFlight::Waiting { port, pkt });
    sched.schedule_at(when, CacheEvent::AccessTiming(req_id));
    Ok(())
}

/// tick of the clock edge `cycles` cycles after the next edge at or after `now`
fn clock_edge(now: Tick, cycles: u64, period: Tick) -> Tick {
    let next = (now + period - 1) / period * period;
    next + cycles * period
}
