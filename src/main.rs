use std::env;
use std::process::ExitCode;
use std::time::Instant;

use env_logger::Env;
use log::{error, info};

use cachesim_simple::commons::SystemConfig;
use cachesim_simple::sim::System;
use cachesim_simple::utils::{builtin_workload, read_trace};
use cachesim_simple::Insts;

fn load_programs(args: &[String]) -> Result<Vec<Insts>, Box<dyn std::error::Error>> {
    if args.is_empty() {
        info!("no trace given, running the built-in workload");
        return Ok(builtin_workload(2));
    }
    let mut programs = Vec::new();
    for path in args {
        programs.push(read_trace(path)?);
    }
    Ok(programs)
}

fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let programs = load_programs(args)?;
    let mut config = SystemConfig::default();
    config.cache.num_cpu_ports = programs.len();
    // small enough that the workloads evict
    config.cache.size = 4 * config.cache.block_size;

    let mut system = System::from_programs(&config, programs)?;
    let t0 = Instant::now();
    let report = system.run(None);
    let t1 = Instant::now();

    print!("{}", report.cache);
    println!("finished simulation in {} ticks", report.ticks);
    info!("execution time {:?}", t1 - t0);
    Ok(())
}

fn main() -> ExitCode {
    // logging
    let env = Env::default()
        .filter_or("CACHESIM_LOG", "info")
        .write_style_or("CACHESIM_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
