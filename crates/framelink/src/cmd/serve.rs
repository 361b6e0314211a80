use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use framelink_frame::{FrameError, FreeListPool};
use framelink_stream::{RpcError, Stream};
use framelink_transport::{Listener, NetStream};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, parse_endpoint, ServeArgs};
use crate::exit::{io_error, rpc_error, transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let pool = Arc::new(FreeListPool::default());
    let config = args.stream.config(pool)?;
    let listener =
        Listener::bind(&endpoint).map_err(|err| transport_error("bind failed", err))?;
    info!(endpoint = %listener.local_endpoint(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut connections = Vec::new();
    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| connections.len() >= count) {
            break;
        }
        let transport = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let id = connections.len() + 1;
        let stream = Stream::with_config(transport, config.clone())
            .map_err(|err| rpc_error("stream setup failed", err))?;
        install_echo(&stream);

        let worker = thread::Builder::new()
            .name(format!("framelink-conn-{id}"))
            .spawn(move || serve_connection(id, stream))
            .map_err(|err| io_error("connection thread spawn failed", err))?;
        connections.push(worker);
    }

    for worker in connections {
        if worker.join().is_err() {
            warn!("connection thread panicked");
        }
    }
    info!("server stopped");
    Ok(SUCCESS)
}

fn install_echo(stream: &Stream<NetStream>) {
    stream.set_request_handler(|stream, request, response| match response {
        Some(mut response) => {
            debug!(size = request.remaining(), "echoing request");
            response.write_bytes(request.rest());
            stream.reply(request, response);
        }
        None => {
            debug!(size = request.remaining(), "one-way request received");
            stream.release(request);
        }
    });
}

fn serve_connection(id: usize, stream: Stream<NetStream>) {
    info!(connection = id, "connection accepted");
    match stream.run() {
        Ok(()) => info!(connection = id, "connection closed"),
        Err(err) if is_hangup(&err) => info!(connection = id, "peer disconnected"),
        Err(err) => warn!(connection = id, error = %err, "connection ended with error"),
    }
}

fn is_hangup(err: &RpcError) -> bool {
    matches!(err, RpcError::Frame(FrameError::ConnectionClosed))
}
