use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use webhive::config::ServerConfig;
use webhive::error::Result;
use webhive::server::Server;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_stop_signal(_signal: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = on_stop_signal as extern "C" fn(libc::c_int);
    unsafe {
        // Broken-pipe writes must surface as I/O errors, not kill us.
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "webhive.conf".to_string());
    let text = std::fs::read_to_string(&config_path)?;
    let config = ServerConfig::from_str(&text)?;

    install_signal_handlers();

    info!("starting with configuration {}", config_path);
    let mut server = Server::new(config)?;
    server.run(&STOP)
}
