// packets carry one memory access between components: address, size, command and payload

use std::fmt;

use crate::commons::{Addr, ReqId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemCmd {
    ReadReq,
    ReadResp,
    WriteReq,
    WriteResp,
    WritebackDirty,
    InvalidateReq,
}

impl MemCmd {
    pub fn is_read(self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::ReadResp)
    }
    pub fn is_write(self) -> bool {
        matches!(self, MemCmd::WriteReq | MemCmd::WriteResp | MemCmd::WritebackDirty)
    }
    pub fn is_response(self) -> bool {
        matches!(self, MemCmd::ReadResp | MemCmd::WriteResp)
    }
    pub fn needs_response(self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::WriteReq)
    }
    fn response(self) -> Option<MemCmd> {
        match self {
            MemCmd::ReadReq => Some(MemCmd::ReadResp),
            MemCmd::WriteReq => Some(MemCmd::WriteResp),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    req_id: ReqId,
    addr: Addr,
    size: usize,
    cmd: MemCmd,
    data: Option<Box<[u8]>>,
}

impl Packet {
    pub fn new(req_id: ReqId, cmd: MemCmd, addr: Addr, size: usize) -> Self {
        Packet { req_id, addr, size, cmd, data: None }
    }
    pub fn read(req_id: ReqId, addr: Addr, size: usize) -> Self {
        Self::new(req_id, MemCmd::ReadReq, addr, size)
    }
    pub fn write(req_id: ReqId, addr: Addr, data: &[u8]) -> Self {
        let mut pkt = Self::new(req_id, MemCmd::WriteReq, addr, data.len());
        pkt.data = Some(data.into());
        pkt
    }

    /// Full-line request standing in for `original` on the memory side. Keeps
    /// the request id of the original so both can be traced back to one access.
    pub fn block_request(original: &Packet, cmd: MemCmd, block_size: usize) -> Self {
        let mut pkt = Self::new(
            original.req_id,
            cmd,
            original.block_addr(block_size),
            block_size,
        );
        pkt.allocate();
        pkt
    }

    /// Write-back of an evicted line. Nobody waits for a response to it.
    pub fn writeback(addr: Addr, data: Box<[u8]>) -> Self {
        Packet {
            req_id: 0,
            addr,
            size: data.len(),
            cmd: MemCmd::WritebackDirty,
            data: Some(data),
        }
    }

    pub fn req_id(&self) -> ReqId { self.req_id }
    pub fn addr(&self) -> Addr { self.addr }
    pub fn size(&self) -> usize { self.size }
    pub fn cmd(&self) -> MemCmd { self.cmd }

    pub fn block_addr(&self, block_size: usize) -> Addr {
        self.addr & !(block_size as Addr - 1)
    }
    fn block_offset(&self, block_size: usize) -> usize {
        (self.addr - self.block_addr(block_size)) as usize
    }

    pub fn is_read(&self) -> bool { self.cmd.is_read() }
    pub fn is_write(&self) -> bool { self.cmd.is_write() }
    pub fn is_response(&self) -> bool { self.cmd.is_response() }
    pub fn needs_response(&self) -> bool { self.cmd.needs_response() }

    /// Turn a request into its response in place. Payload stays attached.
    pub fn make_response(&mut self) {
        self.cmd = match self.cmd.response() {
            Some(cmd) => cmd,
            None => panic!("cannot make a response out of {:?}", self.cmd),
        };
    }

    /// Attach a zeroed payload of `size` bytes unless one is already there.
    pub fn allocate(&mut self) {
        if self.data.is_none() {
            self.data = Some(vec![0u8; self.size].into_boxed_slice());
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().expect("packet has no payload")
    }
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.allocate();
        self.data.as_deref_mut().expect("payload was just allocated")
    }

    /// copy this packet's bytes out of the cache line `block`
    pub fn set_data_from_block(&mut self, block: &[u8], block_size: usize) {
        let off = self.block_offset(block_size);
        assert!(off + self.size <= block_size, "access does not fit into the block");
        let size = self.size;
        self.data_mut().copy_from_slice(&block[off..off + size]);
    }

    /// copy this packet's bytes into the cache line `block`
    pub fn write_data_to_block(&self, block: &mut [u8], block_size: usize) {
        let off = self.block_offset(block_size);
        assert!(off + self.size <= block_size, "access does not fit into the block");
        block[off..off + self.size].copy_from_slice(self.data());
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{:#x}:{:#x}]", self.cmd, self.addr, self.addr + self.size as Addr)
    }
}
