use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framelink_frame::FreeListPool;
use framelink_stream::Stream;
use framelink_transport::{connect, NetStream};
use tracing::{debug, info, warn};

use crate::cmd::{parse_endpoint, BenchArgs};
use crate::exit::{rpc_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_bench, BenchReport, OutputFormat};

#[derive(Default)]
struct WorkerTally {
    latencies: Vec<Duration>,
    failed: usize,
}

pub fn run(args: BenchArgs, format: OutputFormat) -> CliResult<i32> {
    if args.calls == 0 || args.threads == 0 {
        return Err(CliError::new(USAGE, "--calls and --threads must be greater than zero"));
    }
    let endpoint = parse_endpoint(&args.endpoint)?;
    let pool = Arc::new(FreeListPool::default().with_initial_capacity(args.size + 16));
    let config = args.stream.config(pool)?;

    let transport = connect(&endpoint).map_err(|err| transport_error("connect failed", err))?;
    let stream = Stream::with_config(transport, config)
        .map_err(|err| rpc_error("stream setup failed", err))?;
    let payload: Vec<u8> = (0..args.size).map(|i| i as u8).collect();
    info!(calls = args.calls, threads = args.threads, size = args.size, "bench started");

    let started = Instant::now();
    let tallies = thread::scope(|s| {
        s.spawn(|| {
            if let Err(err) = stream.run() {
                debug!(error = %err, "read loop ended");
            }
        });

        let workers: Vec<_> = split_calls(args.calls, args.threads)
            .into_iter()
            .map(|calls| {
                let stream = &stream;
                let payload = payload.as_slice();
                s.spawn(move || run_worker(stream, payload, calls))
            })
            .collect();

        let tallies: Vec<WorkerTally> = workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or_default())
            .collect();
        stream.close();
        tallies
    });
    let elapsed = started.elapsed();

    let mut latencies = Vec::with_capacity(args.calls);
    let mut failed = 0;
    for tally in tallies {
        latencies.extend(tally.latencies);
        failed += tally.failed;
    }
    // A panicked worker leaves its share unaccounted for.
    failed += args.calls.saturating_sub(latencies.len() + failed);

    let report = BenchReport::new(
        endpoint.to_string(),
        args.threads,
        args.size,
        &latencies,
        failed,
        elapsed,
    );
    print_bench(&report, format);

    if failed > 0 {
        warn!(failed, "some calls failed");
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn run_worker(stream: &Stream<NetStream>, payload: &[u8], calls: usize) -> WorkerTally {
    let mut tally = WorkerTally {
        latencies: Vec::with_capacity(calls),
        failed: 0,
    };
    for _ in 0..calls {
        let started = Instant::now();
        match stream.request(payload) {
            Ok(response) => {
                if response.rest() == payload {
                    tally.latencies.push(started.elapsed());
                } else {
                    warn!(
                        expected = payload.len(),
                        received = response.remaining(),
                        "echo mismatch"
                    );
                    tally.failed += 1;
                }
                stream.release(response);
            }
            Err(err) => {
                debug!(error = %err, "call failed");
                tally.failed += 1;
            }
        }
    }
    tally
}

/// Spread `calls` over `threads` as evenly as possible.
fn split_calls(calls: usize, threads: usize) -> Vec<usize> {
    let threads = threads.min(calls).max(1);
    let base = calls / threads;
    let extra = calls % threads;
    (0..threads)
        .map(|i| base + usize::from(i < extra))
        .collect()
}
