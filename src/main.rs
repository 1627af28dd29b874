use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use conf::Config;
use serv_log::info;
use signal_hook::consts::{SIGINT, SIGPIPE, SIGTERM};
use webserv::Result;
use webserv::reactor::Reactor;
use webserv::server::Server;

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "webserv".to_string());
    let (Some(config_path), None) = (args.next(), args.next()) else {
        eprintln!("usage: {} [CONFIG]", program);
        return ExitCode::FAILURE;
    };

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("webserv: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    let config = Config::from_str(&content)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;
    // a dead peer must surface as EPIPE on write, not kill the process
    signal_hook::flag::register(SIGPIPE, Arc::new(AtomicBool::new(false)))?;

    let mut reactor = Reactor::new()?;
    let mut server = Server::new(config, &mut reactor, shutdown)?;

    server.run(&mut reactor)?;
    info!("bye");
    Ok(())
}
