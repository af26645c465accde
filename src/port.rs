// flow control on both sides of the cache.
//
// A send may be refused by the peer. The refused packet is handed back, kept
// here, and resent only once the peer signals that it is ready again.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::cache::CacheEvent;
use crate::commons::{AddrRange, PortId};
use crate::event_q::Schedule;
use crate::packet::Packet;

/// Everything the cache can do to the components it is connected to.
///
/// A refused timing send returns the packet to the caller.
pub trait CacheEnv: Schedule<CacheEvent> {
    fn send_timing_resp(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet>;
    fn send_retry_req(&mut self, port: PortId);
    fn send_range_change(&mut self, port: PortId);
    fn send_timing_req(&mut self, pkt: Packet) -> Result<(), Packet>;
    fn send_functional(&mut self, pkt: &mut Packet);
    fn mem_addr_ranges(&self) -> Vec<AddrRange>;
}

// cpu side

pub struct CpuSidePort {
    id: PortId,
    need_retry: bool,
    blocked_packet: Option<Packet>,
}

impl CpuSidePort {
    pub fn new(id: PortId) -> Self {
        CpuSidePort { id, need_retry: false, blocked_packet: None }
    }

    pub fn id(&self) -> PortId { self.id }
    pub fn need_retry(&self) -> bool { self.need_retry }
    pub fn blocked_packet(&self) -> Option<&Packet> { self.blocked_packet.as_ref() }

    /// Incoming request. `accept` is the owner's decision; any refusal, ours
    /// or the owner's, means we owe the peer a retry.
    pub fn recv_timing_req<F>(&mut self, pkt: Packet, accept: F) -> Result<(), Packet>
    where
        F: FnOnce(Packet) -> Result<(), Packet>,
    {
        debug!("port {} got request {}", self.id, pkt);
        if self.blocked_packet.is_some() || self.need_retry {
            debug!("port {} request blocked", self.id);
            self.need_retry = true;
            return Err(pkt);
        }
        match accept(pkt) {
            Ok(()) => {
                debug!("port {} request succeeded", self.id);
                Ok(())
            }
            Err(pkt) => {
                debug!("port {} request failed", self.id);
                self.need_retry = true;
                Err(pkt)
            }
        }
    }

    pub fn send_packet(&mut self, pkt: Packet, env: &mut impl CacheEnv) {
        assert!(
            self.blocked_packet.is_none(),
            "port {}: should never try to send if blocked", self.id
        );
        if let Err(pkt) = env.send_timing_resp(self.id, pkt) {
            debug!("port {} response refused, holding {}", self.id, pkt);
            self.blocked_packet = Some(pkt);
        }
    }

    pub fn recv_resp_retry(&mut self, env: &mut impl CacheEnv) {
        let Some(pkt) = self.blocked_packet.take() else {
            trace!("port {} got a response retry with nothing to resend", self.id);
            return;
        };
        self.send_packet(pkt, env);
        self.try_send_retry(env);
    }

    pub fn try_send_retry(&mut self, env: &mut impl CacheEnv) {
        if self.need_retry && self.blocked_packet.is_none() {
            self.need_retry = false;
            debug!("sending retry req for {}", self.id);
            env.send_retry_req(self.id);
        }
    }

    pub fn send_range_change(&self, env: &mut impl CacheEnv) {
        env.send_range_change(self.id);
    }
}

// memory side

/// Holds packets the memory refused, oldest first. At most one of them is a
/// demand request; the rest are write-backs queued behind it.
#[derive(Default)]
pub struct MemSidePort {
    blocked: VecDeque<Packet>,
}

impl MemSidePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked.len()
    }

    fn demand_blocked(&self) -> bool {
        self.blocked.iter().any(Packet::needs_response)
    }

    pub fn send_packet(&mut self, pkt: Packet, env: &mut impl CacheEnv) {
        assert!(!self.demand_blocked(), "mem side: should never try to send if blocked");
        self.send_or_hold(pkt, env);
    }

    /// Fire and forget. Queues behind anything already held so memory sees
    /// the write-back before a later refetch of the same line.
    pub fn send_writeback(&mut self, pkt: Packet, env: &mut impl CacheEnv) {
        self.send_or_hold(pkt, env);
    }

    fn send_or_hold(&mut self, pkt: Packet, env: &mut impl CacheEnv) {
        if !self.blocked.is_empty() {
            trace!("mem side busy, queueing {}", pkt);
            self.blocked.push_back(pkt);
            return;
        }
        if let Err(pkt) = env.send_timing_req(pkt) {
            debug!("mem side refused {}", pkt);
            self.blocked.push_back(pkt);
        }
    }

    pub fn recv_req_retry(&mut self, env: &mut impl CacheEnv) {
        if self.blocked.is_empty() {
            trace!("mem side got a retry with nothing to resend");
        }
        while let Some(pkt) = self.blocked.pop_front() {
            if let Err(pkt) = env.send_timing_req(pkt) {
                self.blocked.push_front(pkt);
                break;
            }
        }
    }
}
