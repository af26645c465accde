use thiserror::Error;

pub type Addr = u64;
pub type Tick = u64;
pub type PortId = usize;
pub type ReqId = u64;

// configuration

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {       // unit         reasonable defaults
    pub latency: u64,           // cycles       1
    pub size: u64,              // bytes        16384
    pub block_size: u64,        // bytes        64
    pub num_cpu_ports: usize,   // ports        1
    pub clock_period: Tick,     // ticks        1
    pub seed: u64,              // -            0
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            latency: 1,
            size: 16 * 1024,
            block_size: 64,
            num_cpu_ports: 1,
            clock_period: 1,
            seed: 0,
        }
    }
}

impl CacheConfig {
    /// number of blocks the cache can hold
    pub fn capacity(&self) -> usize {
        (self.size / self.block_size) as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.size % self.block_size != 0 {
            return Err(ConfigError::UnalignedSize { size: self.size, block_size: self.block_size });
        }
        if self.capacity() == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.num_cpu_ports == 0 {
            return Err(ConfigError::NoCpuPorts);
        }
        if self.clock_period == 0 {
            return Err(ConfigError::ZeroClockPeriod);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MemoryConfig {
    pub latency: Tick,
    pub range: AddrRange,
    /// 0 means the memory never applies backpressure
    pub max_outstanding: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            latency: 100,
            range: AddrRange::new(0, 512 << 20),
            max_outstanding: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemConfig {
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.memory.range.size() == 0 {
            return Err(ConfigError::EmptyRange);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size {0} is not a power of two")]
    BlockSize(u64),
    #[error("cache size {size} is not a multiple of the block size {block_size}")]
    UnalignedSize { size: u64, block_size: u64 },
    #[error("cache must hold at least one block")]
    ZeroCapacity,
    #[error("cache needs at least one cpu-side port")]
    NoCpuPorts,
    #[error("clock period must be non-zero")]
    ZeroClockPeriod,
    #[error("memory range is empty")]
    EmptyRange,
    #[error("{programs} programs given for {ports} cpu-side ports")]
    PortMismatch { programs: usize, ports: usize },
}

// address ranges

/// half-open range of addresses `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddrRange {
    pub start: Addr,
    pub end: Addr,
}

impl AddrRange {
    pub fn new(start: Addr, end: Addr) -> Self {
        assert!(start <= end, "address range ends before it starts");
        AddrRange { start, end }
    }
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr < self.end
    }
}
