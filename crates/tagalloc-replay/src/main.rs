//! Replays malloc-lab allocation traces against tagalloc heaps.

use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process,
};

use argh::FromArgs;
use log::info;
use snafu::ResultExt as _;
use snafu_utils::{GenericError, Location, Report, location_of};
use tagalloc::{
    AllocError, CHUNK_SIZE, CheckError, DEFAULT_HEAP_LIMIT, FitPolicy, GrowError, HeapConfig,
    InitError,
};

use self::{
    replay::ReplayError,
    trace::{ParseTraceError, Trace},
};

mod logger;
mod replay;
mod trace;

/// Replay malloc-lab traces and report heap utilization.
#[derive(Debug, FromArgs)]
struct Args {
    #[argh(positional)]
    trace_path: Vec<PathBuf>,
    /// free-list policy to replay with (scanning, linked or segregated);
    /// repeatable, all policies by default
    #[argh(option)]
    policy: Vec<FitPolicy>,
    /// minimum number of bytes the heap grows by
    #[argh(option, default = "CHUNK_SIZE")]
    chunk_size: usize,
    /// maximum heap size in bytes
    #[argh(option, default = "DEFAULT_HEAP_LIMIT")]
    heap_limit: usize,
    /// verify the whole heap after every operation
    #[argh(switch)]
    check: bool,
    /// raise the log level; repeat for more detail
    #[argh(switch, short = 'v')]
    verbose: u8,
}

fn main() {
    let args: Args = argh::from_env();
    logger::init(args.verbose);

    if let Err(err) = run(&args) {
        let report = Report::new(err).with_locator(locate);
        eprintln!("{report}");
        process::exit(1);
    }
}

/// Finds the location of any error type that can end up in a cause chain.
fn locate(err: &(dyn Error + 'static)) -> Option<Location> {
    location_of::<ReplayError>(err)
        .or_else(|| location_of::<ParseTraceError>(err))
        .or_else(|| location_of::<InitError>(err))
        .or_else(|| location_of::<AllocError>(err))
        .or_else(|| location_of::<GrowError>(err))
        .or_else(|| location_of::<CheckError>(err))
}

fn run(args: &Args) -> Result<(), GenericError> {
    let policies = if args.policy.is_empty() {
        FitPolicy::ALL.to_vec()
    } else {
        args.policy.clone()
    };

    for trace_path in &args.trace_path {
        replay_file(args, &policies, trace_path).with_whatever_context(|_| {
            format!("failed to replay trace, path={}", trace_path.display())
        })?;
    }

    Ok(())
}

fn replay_file(args: &Args, policies: &[FitPolicy], path: &Path) -> Result<(), GenericError> {
    let text = fs::read_to_string(path).whatever_context("failed to read trace file")?;
    let trace = Trace::parse(&text).whatever_context("failed to parse trace file")?;
    info!(
        "{}: {} ops over {} ids, suggested heap {} bytes, weight {}",
        path.display(),
        trace.ops.len(),
        trace.id_count,
        trace.suggested_heap_size,
        trace.weight
    );

    for &policy in policies {
        let config = HeapConfig::default()
            .with_policy(policy)
            .with_chunk_size(args.chunk_size)
            .with_heap_limit(args.heap_limit);
        let stats = replay::replay(&trace, config, args.check)
            .with_whatever_context(|_| format!("replay failed, policy={policy}"))?;
        println!(
            "{}  {:<10}  ops={:<6}  peak={:<9}  heap={:<9}  util={:5.1}%",
            path.display(),
            policy.name(),
            stats.ops,
            stats.peak_payload,
            stats.heap_size,
            stats.utilization()
        );
    }

    Ok(())
}
