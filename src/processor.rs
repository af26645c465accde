use std::collections::VecDeque;

use log::{debug, info};

use crate::commons::{Addr, ReqId, Tick};
use crate::event_q::Schedule;
use crate::packet::{MemCmd, Packet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    Read { addr: Addr, size: usize },
    Write { addr: Addr, data: Vec<u8> },
    Other(u64),     // cycles of non-memory work
}

pub type Insts = VecDeque<Instr>;

#[derive(Debug)]
pub enum ProcEvent {
    Tick,
    RetryReq,       // the cache can take our held request now
    SendRespRetry,  // we can take the held response now
}

/// What a processor can do to the cache it sits in front of.
pub trait ProcEnv: Schedule<ProcEvent> {
    fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet>;
    fn send_resp_retry(&mut self);
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcState {
    Idle,
    ExecutingOther,
    WaitingForRetry,
    WaitingForCache,
    Done,
}

/// one answered memory access
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub req_id: ReqId,
    pub cmd: MemCmd,
    pub addr: Addr,
    pub data: Vec<u8>,
    pub issued: Tick,
    pub answered: Tick,
}

impl Completion {
    pub fn latency(&self) -> Tick {
        self.answered - self.issued
    }
}

/// Replays a list of instructions as a blocking requestor: at most one
/// request outstanding, a refused request is only resent on a retry.
pub struct Processor {
    pub id: u32,
    pub state: ProcState,
    insts: Insts,
    next_req: u64,
    held_req: Option<Packet>,
    issued: Tick,
    // refuse the first offer of every n-th response (0: never) and signal
    // readiness `resp_retry_delay` later
    refuse_every: u32,
    resp_retry_delay: Tick,
    pushed_back: bool,
    refused_resps: u32,
    retries_seen: u32,
    range_changes: u32,
    completions: Vec<Completion>,
}

impl Processor {
    pub fn new(id: u32, insts: Insts) -> Self {
        Processor {
            id,
            state: ProcState::Idle,
            insts,
            next_req: 0,
            held_req: None,
            issued: 0,
            refuse_every: 0,
            resp_retry_delay: 1,
            pushed_back: false,
            refused_resps: 0,
            retries_seen: 0,
            range_changes: 0,
            completions: Vec::new(),
        }
    }

    /// Make this processor push back once on every `every`-th response.
    pub fn with_resp_backpressure(mut self, every: u32, retry_delay: Tick) -> Self {
        self.refuse_every = every;
        self.resp_retry_delay = retry_delay.max(1);
        self
    }

    pub fn completions(&self) -> &[Completion] { &self.completions }
    pub fn refused_resps(&self) -> u32 { self.refused_resps }
    pub fn retries_seen(&self) -> u32 { self.retries_seen }
    pub fn range_changes(&self) -> u32 { self.range_changes }
    pub fn is_done(&self) -> bool { self.state == ProcState::Done }

    fn new_req_id(&mut self) -> ReqId {
        self.next_req += 1;
        (u64::from(self.id) << 32) | self.next_req
    }

    fn send_cache_req(&mut self, pkt: Packet, env: &mut impl ProcEnv) {
        debug!("proc {} sending {}", self.id, pkt);
        match env.send_timing_req(pkt) {
            Ok(()) => self.state = ProcState::WaitingForCache,
            Err(pkt) => {
                debug!("proc {} request refused, waiting for retry", self.id);
                self.held_req = Some(pkt);
                self.state = ProcState::WaitingForRetry;
            }
        }
    }

    fn on_tick(&mut self, env: &mut impl ProcEnv) {
        if self.state != ProcState::Idle && self.state != ProcState::ExecutingOther {
            return;
        }
        let Some(inst) = self.insts.pop_front() else {
            info!("proc {} done", self.id);
            self.state = ProcState::Done;
            return;
        };
        match inst {
            Instr::Read { addr, size } => {
                let pkt = Packet::read(self.new_req_id(), addr, size);
                self.issued = env.cur_tick();
                self.send_cache_req(pkt, env);
            }
            Instr::Write { addr, data } => {
                let pkt = Packet::write(self.new_req_id(), addr, &data);
                self.issued = env.cur_tick();
                self.send_cache_req(pkt, env);
            }
            Instr::Other(d) => {
                self.state = ProcState::ExecutingOther;
                env.schedule_in(d.max(1), ProcEvent::Tick);
            }
        }
    }

    pub fn process(&mut self, ev: ProcEvent, env: &mut impl ProcEnv) {
        match ev {
            ProcEvent::Tick => self.on_tick(env),
            ProcEvent::RetryReq => {
                self.retries_seen += 1;
                if let Some(pkt) = self.held_req.take() {
                    self.send_cache_req(pkt, env);
                }
            }
            ProcEvent::SendRespRetry => env.send_resp_retry(),
        }
    }

    /// Response from the cache. Must not call back into the cache; the next
    /// request goes out on the following cycle.
    pub fn recv_timing_resp(&mut self, pkt: Packet, sched: &mut impl Schedule<ProcEvent>) -> Result<(), Packet> {
        let nth = self.completions.len() as u32 + 1;
        if self.refuse_every > 0 && !self.pushed_back && nth % self.refuse_every == 0 {
            debug!("proc {} pushing back on {}", self.id, pkt);
            self.pushed_back = true;
            self.refused_resps += 1;
            sched.schedule_in(self.resp_retry_delay, ProcEvent::SendRespRetry);
            return Err(pkt);
        }
        self.pushed_back = false;
        assert_eq!(self.state, ProcState::WaitingForCache, "proc {} got an unexpected response", self.id);
        debug!("proc {} cache response received", self.id);
        let now = sched.cur_tick();
        self.completions.push(Completion {
            req_id: pkt.req_id(),
            cmd: pkt.cmd(),
            addr: pkt.addr(),
            data: if pkt.has_data() { pkt.data().to_vec() } else { Vec::new() },
            issued: self.issued,
            answered: now,
        });
        self.state = ProcState::Idle;
        sched.schedule_in(1, ProcEvent::Tick);
        Ok(())
    }

    pub fn recv_range_change(&mut self) {
        self.range_changes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_q::EventQueue;

    struct FakeCache {
        q: EventQueue<ProcEvent>,
        accept: bool,
        reqs: Vec<Packet>,
        resp_retries: usize,
    }

    impl Schedule<ProcEvent> for FakeCache {
        fn cur_tick(&self) -> Tick { self.q.now() }
        fn schedule_at(&mut self, when: Tick, ev: ProcEvent) { self.q.push(when, ev) }
    }

    impl ProcEnv for FakeCache {
        fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet> {
            if !self.accept {
                return Err(pkt);
            }
            self.reqs.push(pkt);
            Ok(())
        }
        fn send_resp_retry(&mut self) {
            self.resp_retries += 1;
        }
    }

    fn fake(accept: bool) -> FakeCache {
        FakeCache { q: EventQueue::new(), accept, reqs: Vec::new(), resp_retries: 0 }
    }

    fn answer(p: &mut Processor, c: &mut FakeCache) -> Result<(), Packet> {
        let mut pkt = c.reqs.remove(0);
        pkt.allocate();
        pkt.make_response();
        p.recv_timing_resp(pkt, c)
    }

    #[test]
    fn one_request_at_a_time() {
        let insts = Insts::from(vec![
            Instr::Read { addr: 0, size: 4 },
            Instr::Other(3),
            Instr::Write { addr: 8, data: vec![1] },
        ]);
        let mut p = Processor::new(1, insts);
        let mut c = fake(true);
        p.process(ProcEvent::Tick, &mut c);
        p.process(ProcEvent::Tick, &mut c);
        assert_eq!(c.reqs.len(), 1, "blocked until answered");
        assert_eq!(c.reqs[0].req_id(), (1 << 32) | 1);

        answer(&mut p, &mut c).unwrap();
        while let Some((_, ev)) = c.q.pop() {
            p.process(ev, &mut c);
        }
        // Other(3) took us from tick 1 to 4
        assert_eq!(c.reqs.len(), 1);
        assert_eq!(c.reqs[0].cmd(), MemCmd::WriteReq);
        assert_eq!(c.q.now(), 4);
        answer(&mut p, &mut c).unwrap();
        while let Some((_, ev)) = c.q.pop() {
            p.process(ev, &mut c);
        }
        assert!(p.is_done());
        assert_eq!(p.completions().len(), 2);
    }

    #[test]
    fn refused_request_waits_for_retry() {
        let mut p = Processor::new(0, Insts::from(vec![Instr::Read { addr: 0, size: 4 }]));
        let mut c = fake(false);
        p.process(ProcEvent::Tick, &mut c);
        assert_eq!(p.state, ProcState::WaitingForRetry);
        c.accept = true;
        p.process(ProcEvent::RetryReq, &mut c);
        assert_eq!(p.state, ProcState::WaitingForCache);
        assert_eq!(c.reqs.len(), 1);
        // a second retry has nothing to resend
        p.process(ProcEvent::RetryReq, &mut c);
        assert_eq!(c.reqs.len(), 1);
        assert_eq!(p.retries_seen(), 2);
    }

    #[test]
    fn pushes_back_on_responses() {
        let mut p = Processor::new(0, Insts::from(vec![Instr::Read { addr: 0, size: 4 }]))
            .with_resp_backpressure(1, 5);
        let mut c = fake(true);
        p.process(ProcEvent::Tick, &mut c);
        assert!(answer(&mut p, &mut c).is_err());
        assert_eq!(p.refused_resps(), 1);
        let (t, ev) = c.q.pop().unwrap();
        assert_eq!(t, 5);
        p.process(ev, &mut c);
        assert_eq!(c.resp_retries, 1);
    }
}
