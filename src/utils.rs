use std::fs;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::commons::Addr;
use crate::processor::{Instr, Insts};

/// access size when a trace line gives none
pub const DEFAULT_ACCESS_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("cannot read trace {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {msg}")]
    Parse { path: String, line: usize, msg: String },
}

fn parse_hex(s: &str) -> Result<u64, String> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| format!("bad hex value {:?}: {}", s, e))
}

fn parse_line(line: &str) -> Result<Option<Instr>, String> {
    let mut parts = line.split_whitespace();
    let Some(op) = parts.next() else {
        return Ok(None);
    };
    if op.starts_with('#') {
        return Ok(None);
    }
    let val = parse_hex(parts.next().ok_or("missing address")?)?;
    let size = match parts.next() {
        Some(s) => s.parse::<usize>().map_err(|e| format!("bad size {:?}: {}", s, e))?,
        None => DEFAULT_ACCESS_SIZE,
    };
    if size == 0 {
        return Err("zero sized access".into());
    }
    let inst = match op {
        "0" => Instr::Read { addr: val as Addr, size },
        "1" => {
            let fill = match parts.next() {
                Some(s) => u8::try_from(parse_hex(s)?).map_err(|_| format!("fill byte {:?} too large", s))?,
                None => 0,
            };
            Instr::Write { addr: val as Addr, data: vec![fill; size] }
        }
        "2" => Instr::Other(val),
        _ => return Err(format!("invalid instruction {:?}", op)),
    };
    Ok(Some(inst))
}

/// Parse one trace: `<op> <hex addr> [size] [hex fill byte]` per line, op 0
/// reads, 1 writes, 2 spends the address column in cycles of other work.
pub fn parse_trace(path: &str, text: &str) -> Result<Insts, TraceError> {
    let mut insts = Insts::new();
    for (i, line) in text.lines().enumerate() {
        let parsed = parse_line(line).map_err(|msg| TraceError::Parse {
            path: path.to_string(),
            line: i + 1,
            msg,
        })?;
        insts.extend(parsed);
    }
    Ok(insts)
}

pub fn read_trace(path: impl AsRef<Path>) -> Result<Insts, TraceError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    info!("reading file: {}", name);
    let text = fs::read_to_string(path).map_err(|source| TraceError::Io { path: name.clone(), source })?;
    parse_trace(&name, &text)
}

/// A small workload per processor: a partial write, reads around it, and
/// enough distinct lines to force evictions in a tiny cache.
pub fn builtin_workload(num_procs: usize) -> Vec<Insts> {
    (0..num_procs as u64)
        .map(|p| {
            let base = p * 0x1000;
            let mut insts = Insts::from(vec![
                Instr::Write { addr: base + 4, data: vec![0xab; 4] },
                Instr::Read { addr: base, size: 64 },
                Instr::Other(3),
                Instr::Read { addr: base + 6, size: 2 },
            ]);
            for i in 1..8 {
                insts.push_back(Instr::Read { addr: base + i * 64, size: 8 });
            }
            insts.push_back(Instr::Read { addr: base + 4, size: 4 });
            insts
        })
        .collect()
}
