// block storage: aligned block address -> line of `block_size` bytes

use std::collections::HashMap;

use log::trace;
use rand::Rng;

use crate::commons::Addr;
use crate::packet::Packet;

pub struct BlockStore {
    block_size: usize,
    capacity: usize,
    blocks: HashMap<Addr, Box<[u8]>>,
    // live addresses, dense, so a victim is one random index away
    addrs: Vec<Addr>,
}

impl BlockStore {
    pub fn new(block_size: usize, capacity: usize) -> Self {
        assert!(capacity > 0, "block store needs room for at least one block");
        BlockStore {
            block_size,
            capacity,
            blocks: HashMap::with_capacity(capacity),
            addrs: Vec::with_capacity(capacity),
        }
    }

    pub fn block_size(&self) -> usize { self.block_size }
    pub fn capacity(&self) -> usize { self.capacity }
    pub fn len(&self) -> usize { self.addrs.len() }
    pub fn is_empty(&self) -> bool { self.addrs.is_empty() }
    pub fn is_full(&self) -> bool { self.len() >= self.capacity }

    pub fn contains(&self, block_addr: Addr) -> bool {
        self.blocks.contains_key(&block_addr)
    }
    pub fn get(&self, block_addr: Addr) -> Option<&[u8]> {
        self.blocks.get(&block_addr).map(|b| &**b)
    }
    pub fn addrs(&self) -> &[Addr] {
        &self.addrs
    }

    /// Read or write `pkt` against its block. Returns false, touching
    /// nothing, if the block is not present.
    pub fn access_functional(&mut self, pkt: &mut Packet) -> bool {
        let block_addr = pkt.block_addr(self.block_size);
        let Some(block) = self.blocks.get_mut(&block_addr) else {
            return false;
        };
        if pkt.is_write() {
            pkt.write_data_to_block(block, self.block_size);
        } else if pkt.is_read() {
            pkt.set_data_from_block(block, self.block_size);
        } else {
            panic!("unknown packet type {:?} in functional access", pkt.cmd());
        }
        true
    }

    /// Remove a block chosen uniformly at random among the stored ones.
    pub fn evict_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> (Addr, Box<[u8]>) {
        assert!(!self.is_empty(), "nothing to evict");
        let slot = rng.gen_range(0..self.addrs.len());
        let addr = self.addrs.swap_remove(slot);
        let data = self.blocks.remove(&addr).expect("address list and map out of sync");
        trace!("evicted block {:#x}", addr);
        (addr, data)
    }

    /// Store a fresh copy of `data` at `block_addr`. The caller evicts first.
    pub fn insert(&mut self, block_addr: Addr, data: &[u8]) {
        assert_eq!(block_addr % self.block_size as Addr, 0, "block address {:#x} not aligned", block_addr);
        assert_eq!(data.len(), self.block_size, "inserted data is not one block");
        assert!(!self.contains(block_addr), "block {:#x} is already cached", block_addr);
        assert!(!self.is_full(), "block store is full");
        self.addrs.push(block_addr);
        self.blocks.insert(block_addr, data.into());
    }
}
