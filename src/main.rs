use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info};

use ofp_udp::{Config, OfpController, UdpTransport};

fn run() -> ofp_udp::Result<()> {
    let config = Config::from_env();
    let transport = Arc::new(UdpTransport::bind(
        config.bind_addr(),
        config.recv_timeout,
    )?);
    info!("controller listening on udp:{}", config.bind_addr());

    let controller = Arc::new(OfpController::new(transport.clone(), config.clone()));
    let running = Arc::new(AtomicBool::new(true));

    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .expect("failed to install signal handler");
    }

    // Keepalive runs on its own timer thread; the session table lock
    // serializes it against the dispatch loop below. A transport failure
    // here stops the whole process, same as on the receive path.
    let keepalive = {
        let controller = controller.clone();
        let running = running.clone();
        let interval = config.keepalive_interval;
        thread::spawn(move || -> ofp_udp::Result<()> {
            let mut last_tick = std::time::Instant::now();
            while running.load(Ordering::SeqCst) {
                thread::sleep(std::time::Duration::from_millis(100));
                if last_tick.elapsed() >= interval {
                    if let Err(e) = controller.keepalive_tick() {
                        error!("keepalive failed: {}", e);
                        running.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                    last_tick = std::time::Instant::now();
                }
            }
            Ok(())
        })
    };

    while running.load(Ordering::SeqCst) {
        match transport.recv()? {
            Some((buf, peer)) => controller.handle_datagram(&buf, peer)?,
            None => (), // bounded wait elapsed; re-check shutdown
        }
    }

    info!("shutting down ({} sessions)", controller.session_count());
    match keepalive.join() {
        Ok(result) => result?,
        Err(_) => error!("keepalive thread panicked"),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("fatal: {}", e);
        process::exit(1);
    }
}
