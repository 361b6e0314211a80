use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use framelink_frame::HeapPool;
use framelink_stream::Stream;
use framelink_transport::connect;
use tracing::debug;

use crate::cmd::{parse_endpoint, parse_hex, CallArgs};
use crate::exit::{io_error, rpc_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_call, CallReport, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let payload = resolve_payload(&args)?;
    let config = args.stream.config(Arc::new(HeapPool))?;

    let transport = connect(&endpoint).map_err(|err| transport_error("connect failed", err))?;
    let stream = Stream::with_config(transport, config)
        .map_err(|err| rpc_error("stream setup failed", err))?;

    let started = Instant::now();
    let outcome = thread::scope(|s| {
        s.spawn(|| {
            if let Err(err) = stream.run() {
                debug!(error = %err, "read loop ended");
            }
        });

        let outcome = if args.one_way {
            stream.notify(&payload).map(|()| None)
        } else {
            stream.request(&payload).map(Some)
        };
        stream.close();
        outcome
    });
    let elapsed = started.elapsed();

    let response = outcome.map_err(|err| rpc_error("call failed", err))?;
    let body = response.as_ref().map(|buffer| buffer.rest());
    let report = CallReport::new(endpoint.to_string(), payload.len(), body, elapsed);
    print_call(&report, body, format);

    if let Some(buffer) = response {
        stream.release(buffer);
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &CallArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    Ok(Vec::new())
}
