use cachesim_simple::commons::{AddrRange, ConfigError, SystemConfig};
use cachesim_simple::event_q::EventQueue;
use cachesim_simple::processor::{Instr, Insts, Processor};
use cachesim_simple::sim::System;
use cachesim_simple::{MemCmd, Packet};

fn config(blocks: u64, ports: usize) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.cache.size = blocks * config.cache.block_size;
    config.cache.num_cpu_ports = ports;
    config
}

fn system(config: &SystemConfig, programs: Vec<Vec<Instr>>) -> System {
    let programs = programs.into_iter().map(Insts::from).collect();
    System::from_programs(config, programs).unwrap()
}

#[test]
fn test_event_queue() {
    let mut q = EventQueue::<i32>::new();
    q.push(0, 42);
    q.push(0, 43);
    q.push(1, 44);

    let mut seen = Vec::new();
    let mut x = false;
    while let Some((t, ev)) = q.pop() {
        seen.push((t, ev));
        if !x {
            // appended during the drain, still due this tick
            q.push(q.now(), 100);
            x = true;
        }
    }
    assert_eq!(seen, vec![(0, 42), (0, 43), (0, 100), (1, 44)]);
    assert_eq!(q.now(), 1);
}

#[test]
fn miss_then_hit() {
    let config = config(2, 1);
    let mut sys = system(&config, vec![vec![
        Instr::Read { addr: 0, size: 64 },
        Instr::Read { addr: 0, size: 64 },
    ]]);
    let report = sys.run(None);
    assert!(report.all_done);

    let done = sys.procs()[0].completions();
    assert_eq!(done.len(), 2);
    // cache latency, then memory latency
    assert_eq!(done[0].latency(), 101);
    assert_eq!(done[1].latency(), 1);
    assert_eq!(done[1].data[17], 17);
    assert_eq!((report.cache.hits, report.cache.misses), (1, 1));
    assert_eq!(report.cache.miss_latency.max(), 100);
    assert_eq!(sys.memory().stats().reads, 1);
    assert_eq!(report.ticks, 104);
    assert_eq!(report.completions[0], done.to_vec());
}

#[test]
fn eviction_writes_back_the_dirty_victim() {
    let mut victims = Vec::new();
    for seed in 0..32 {
        let mut config = config(2, 1);
        config.cache.seed = seed;
        let mut sys = system(&config, vec![vec![
            Instr::Write { addr: 0, data: vec![0xaa; 4] },
            Instr::Write { addr: 64, data: vec![0xbb; 4] },
            Instr::Read { addr: 128, size: 64 },
        ]]);
        assert!(sys.run(None).all_done);

        assert_eq!(sys.memory().stats().writebacks, 1);
        let store = sys.cache().store();
        assert!(store.contains(128));
        assert_eq!(store.len(), 2);
        let victim = if store.contains(0) { 64 } else { 0 };
        assert!(!store.contains(victim));
        let kept = 64 - victim;
        assert_eq!(sys.memory().peek(victim), if victim == 0 { 0xaa } else { 0xbb });
        assert_eq!(sys.memory().peek(kept), kept as u8, "kept line never reached memory");
        victims.push(victim);
    }
    assert!(victims.contains(&0) && victims.contains(&64));
}

#[test]
fn partial_write_allocates_the_line() {
    let config = config(1, 1);
    let mut sys = system(&config, vec![vec![
        Instr::Write { addr: 4, data: vec![0xde, 0xad, 0xbe, 0xef] },
    ]]);
    assert!(sys.run(None).all_done);

    let done = &sys.procs()[0].completions()[0];
    assert_eq!((done.cmd, done.addr), (MemCmd::WriteResp, 4));
    assert_eq!(sys.memory().stats().reads, 1);
    assert_eq!(sys.memory().stats().writes, 0);

    let block = sys.cache().store().get(0).unwrap();
    for (i, b) in block.iter().enumerate() {
        let expected = match i {
            4..=7 => [0xde, 0xad, 0xbe, 0xef][i - 4],
            _ => i as u8,
        };
        assert_eq!(*b, expected, "byte {}", i);
    }

    let mut rd = Packet::read(7, 4, 4);
    sys.functional(&mut rd);
    assert_eq!(rd.data(), &[0xde, 0xad, 0xbe, 0xef]);
    assert!(rd.is_response());
}

#[test]
fn blocked_processors_are_retried() {
    let config = config(4, 3);
    let mut sys = system(&config, vec![
        vec![Instr::Read { addr: 0, size: 8 }, Instr::Read { addr: 0, size: 8 }],
        vec![Instr::Read { addr: 64, size: 8 }],
        vec![Instr::Other(2), Instr::Write { addr: 128, data: vec![1] }],
    ]);
    let report = sys.run(None);
    assert!(report.all_done);
    assert_eq!(report.cache.misses, 3);
    assert_eq!(report.cache.hits, 1);
    assert!(sys.procs()[1].retries_seen() > 0);
    assert!(sys.procs()[2].retries_seen() > 0);
    assert!(!sys.cache().is_blocked());
    for p in sys.cache().cpu_ports() {
        assert!(!p.need_retry());
    }
}

#[test]
fn memory_backpressure_orders_writeback_before_refetch() {
    let mut config = config(1, 1);
    config.memory.max_outstanding = 1;
    let mut sys = system(&config, vec![vec![
        Instr::Write { addr: 0, data: vec![0xaa; 4] },
        Instr::Read { addr: 64, size: 64 },
        Instr::Read { addr: 0, size: 4 },
    ]]);
    assert!(sys.run(None).all_done);

    // the refetch of line 0 was refused while its write-back was in memory
    assert!(sys.memory().stats().refused > 0);
    // line 0 leaves for line 64, then line 64 for the refetched line 0
    assert_eq!(sys.memory().stats().writebacks, 2);
    assert_eq!(sys.memory().stats().reads, 3);
    assert_eq!(sys.cache().mem_port().blocked_len(), 0);
    assert!(sys.cache().store().contains(0));

    // memory served the refetch after applying the write-back
    let last = sys.procs()[0].completions().last().unwrap();
    assert_eq!(last.data, vec![0xaa; 4]);
    assert_eq!(sys.memory().peek(0), 0xaa);
    assert_eq!(sys.memory().peek(64), 64);
}

#[test]
fn requestor_backpressure_delays_the_response() {
    let config = config(2, 1);
    let proc = Processor::new(0, Insts::from(vec![Instr::Read { addr: 0, size: 64 }]))
        .with_resp_backpressure(1, 5);
    let mut sys = System::new(&config, vec![proc]).unwrap();
    let report = sys.run(None);
    assert!(report.all_done);

    let p = &sys.procs()[0];
    assert_eq!(p.refused_resps(), 1);
    assert_eq!(p.completions()[0].latency(), 106);
    assert_eq!(report.cache.miss_latency.max(), 100);
    assert!(sys.cache().cpu_ports()[0].blocked_packet().is_none());
}

#[test]
fn run_stops_at_the_limit() {
    let config = config(2, 1);
    let mut sys = system(&config, vec![vec![Instr::Read { addr: 0, size: 64 }]]);
    let report = sys.run(Some(50));
    assert!(!report.all_done);
    assert!(report.ticks <= 50);
    assert!(sys.cache().is_blocked());
    assert!(sys.run(None).all_done);
}

#[test]
fn functional_reads_go_to_memory_on_a_miss() {
    let config = config(2, 1);
    let mut sys = system(&config, vec![vec![]]);
    let mut rd = Packet::read(1, 0x203, 2);
    sys.functional(&mut rd);
    assert_eq!(rd.data(), &[0x03, 0x04]);
    assert_eq!(sys.cache().stats().hits + sys.cache().stats().misses, 0);
}

#[test]
fn range_changes_reach_every_processor() {
    let config = config(2, 2);
    let mut sys = system(&config, vec![vec![], vec![]]);
    assert_eq!(sys.addr_ranges(), vec![config.memory.range]);

    let range = AddrRange::new(0, 1 << 20);
    sys.set_memory_range(range);
    sys.run(None);
    assert_eq!(sys.addr_ranges(), vec![range]);
    for p in sys.procs() {
        assert_eq!(p.range_changes(), 1);
    }
}

#[test]
fn program_count_must_match_ports() {
    let config = config(2, 1);
    let err = System::from_programs(&config, vec![Insts::new(), Insts::new()]).err();
    assert_eq!(err, Some(ConfigError::PortMismatch { programs: 2, ports: 1 }));

    let mut bad = config;
    bad.cache.block_size = 48;
    assert!(matches!(
        System::from_programs(&bad, vec![Insts::new()]),
        Err(ConfigError::BlockSize(48))
    ));
}
