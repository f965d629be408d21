use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use devlink_peer::{serve_tcp, DeviceSimulator, CHUNK_SIZE};
use serde::Serialize;

use crate::cmd::SimulateArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct SimulateOutput {
    listening: String,
    chunks: u16,
    metadata: String,
}

impl Record for SimulateOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("listening", self.listening.clone()),
            ("chunks", self.chunks.to_string()),
            ("metadata", self.metadata.clone()),
        ]
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let data = vec![args.fill; usize::from(args.chunks) * CHUNK_SIZE];
    let mut simulator = DeviceSimulator::new(args.metadata.as_bytes(), &data)
        .map_err(|err| peer_error("invalid simulator setup", err))?;

    let listener = TcpListener::bind(&args.bind)
        .map_err(|err| io_error(&format!("bind {} failed", args.bind), err))?;
    let local = listener
        .local_addr()
        .map_err(|err| io_error("bind address unavailable", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop))?;

    // Printed before serving so callers can learn an ephemeral port.
    print_record(
        &SimulateOutput {
            listening: local.to_string(),
            chunks: args.chunks,
            metadata: args.metadata.clone(),
        },
        format,
    );

    serve_tcp(&listener, &mut simulator, &stop)
        .map_err(|err| io_error("simulator failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
