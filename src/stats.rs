use std::fmt;

use crate::commons::Tick;

/// Fixed number of buckets whose width doubles whenever a sample lands
/// past the covered range, so any latency fits without reconfiguration.
#[derive(Clone, Debug)]
pub struct Histogram {
    buckets: Vec<u64>,
    bucket_size: u64,
    samples: u64,
    sum: u64,
    min: Option<u64>,
    max: u64,
}

impl Histogram {
    pub fn new(num_buckets: usize) -> Self {
        assert!(num_buckets >= 2 && num_buckets % 2 == 0, "histogram needs an even bucket count");
        Histogram {
            buckets: vec![0; num_buckets],
            bucket_size: 1,
            samples: 0,
            sum: 0,
            min: None,
            max: 0,
        }
    }

    /// `None` once the range reaches past `u64::MAX`
    fn covered(&self) -> Option<u64> {
        self.bucket_size.checked_mul(self.buckets.len() as u64)
    }

    fn grow(&mut self) {
        let n = self.buckets.len();
        for i in 0..n / 2 {
            self.buckets[i] = self.buckets[2 * i] + self.buckets[2 * i + 1];
        }
        for b in &mut self.buckets[n / 2..] {
            *b = 0;
        }
        self.bucket_size *= 2;
    }

    pub fn sample(&mut self, val: u64) {
        while self.covered().is_some_and(|c| val >= c) {
            self.grow();
        }
        self.buckets[(val / self.bucket_size) as usize] += 1;
        self.samples += 1;
        self.sum = self.sum.saturating_add(val);
        self.min = Some(self.min.map_or(val, |m| m.min(val)));
        self.max = self.max.max(val);
    }

    pub fn buckets(&self) -> &[u64] { &self.buckets }
    pub fn bucket_size(&self) -> u64 { self.bucket_size }
    pub fn samples(&self) -> u64 { self.samples }
    pub fn min(&self) -> Option<u64> { self.min }
    pub fn max(&self) -> u64 { self.max }

    pub fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum as f64 / self.samples as f64)
    }
}

#[derive(Clone, Debug)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub miss_latency: Histogram,
}

impl Default for CacheStats {
    fn default() -> Self {
        CacheStats {
            hits: 0,
            misses: 0,
            miss_latency: Histogram::new(16),
        }
    }
}

impl CacheStats {
    /// `None` until the first access
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }

    pub fn sample_miss_latency(&mut self, ticks: Tick) {
        self.miss_latency.sample(ticks);
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<32}{:>12} # Number of hits", "hits", self.hits)?;
        writeln!(f, "{:<32}{:>12} # Number of misses", "misses", self.misses)?;
        match self.hit_ratio() {
            Some(r) => writeln!(f, "{:<32}{:>12.6} # The ratio of hits to the total accesses to the cache", "hitRatio", r)?,
            None => writeln!(f, "{:<32}{:>12} # The ratio of hits to the total accesses to the cache", "hitRatio", "nan")?,
        }
        let h = &self.miss_latency;
        writeln!(f, "{:<32}{:>12} # Ticks for misses to the cache", "missLatency::samples", h.samples())?;
        if let Some(mean) = h.mean() {
            writeln!(f, "{:<32}{:>12.2}", "missLatency::mean", mean)?;
        }
        for (i, n) in h.buckets().iter().enumerate() {
            let lo = i as u64 * h.bucket_size();
            let hi = lo + h.bucket_size() - 1;
            writeln!(f, "{:<32}{:>12}", format!("missLatency::{}-{}", lo, hi), n)?;
        }
        Ok(())
    }
}
