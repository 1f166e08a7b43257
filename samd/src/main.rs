//! Daemon wiring for the bus engine: flag parsing, logging setup, and a
//! subscription loop that emits every state change as a JSON line. The
//! HTTP/WebSocket front end consumes the same engine surface; this binary
//! stands alone so the engine can run (and be observed) without it.

use clap::{CommandFactory, Parser};
use sambus::Engine;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "samd")]
#[command(about = "Bridge a Carrier Infinity HVAC bus to a network control surface")]
struct Args {
    /// HTTP port for the web front end
    #[arg(long = "httpport", default_value_t = 8080)]
    httpport: u16,

    /// Path to the serial device wired to the RS-485 bus
    #[arg(long)]
    serial: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();

    let Some(serial) = args.serial else {
        eprintln!("must provide serial");
        Args::command().print_help().ok();
        std::process::exit(1);
    };

    let engine = match Engine::start(&serial) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("error opening serial port: {e:}");
            std::process::exit(1);
        }
    };

    log::info!("engine up on {serial}, http port {} reserved", args.httpport);

    // Replay the current state, then follow changes for as long as the
    // engine lives.
    for (source, data) in engine.cache_dump() {
        emit(source, &json!({ "source": source, "data": data }));
    }

    let mut listener = engine.new_listener();
    while let Some(event) = listener.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => log::info!("{line}"),
            Err(e) => log::error!("cannot serialize event: {e:}"),
        }
    }

    log::warn!("event stream closed, shutting down");
}

fn emit(source: &str, value: &serde_json::Value) {
    match serde_json::to_string(value) {
        Ok(line) => log::info!("{line}"),
        Err(e) => log::error!("cannot serialize {source} snapshot: {e:}"),
    }
}
