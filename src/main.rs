#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use rumblepad::probe::{self, FeedbackProbe};
    use rumblepad::virtual_controller::VirtualJoypad;
    use rumblepad::Config;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let self_test = std::env::args().any(|arg| arg.trim() == "--self-test");
    let write_config = std::env::args().any(|arg| arg.trim() == "--write-config");
    let config = Config::load().unwrap_or_default();

    if write_config {
        config.save()?;
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let (rumble_tx, rumble_rx) = crossbeam_channel::unbounded();
    let joypad = VirtualJoypad::new(
        &config,
        Some(Box::new(move |strong, weak| {
            let _ = rumble_tx.send((strong, weak));
        })),
    )?;

    match joypad.device_nodes() {
        Ok(nodes) if !nodes.is_empty() => log::info!("Device nodes: {:?}", nodes),
        Ok(_) => log::info!("Device nodes not created yet"),
        Err(e) => log::warn!("Unable to list device nodes: {}", e),
    }

    let self_test_handle = if self_test {
        let mut probe = FeedbackProbe::wait_for(&joypad, Duration::from_secs(2))?;
        log::info!("Self-test using {}", probe.path().display());
        Some(thread::spawn(move || {
            for (strong, weak) in [(0xffff, 0), (0, 0xffff), (0x8000, 0x4000)] {
                log::info!("Self-test: playing rumble ({}, {})", strong, weak);
                if let Err(e) = probe::play_rumble(&mut probe, strong, weak, 500) {
                    log::error!("Self-test failed: {:#}", e);
                    return;
                }
                thread::sleep(Duration::from_millis(200));
            }
            log::info!("Self-test finished");
        }))
    } else {
        None
    };

    log::info!("Running, press Ctrl-C to exit");
    while running.load(Ordering::SeqCst) {
        if let Ok((strong, weak)) = rumble_rx.recv_timeout(Duration::from_millis(100)) {
            log::info!("Rumble: strong={} weak={}", strong, weak);
        }

        if self_test_handle.as_ref().is_some_and(|handle| handle.is_finished()) {
            break;
        }
    }

    if let Some(handle) = self_test_handle {
        if handle.join().is_err() {
            log::error!("Self-test thread panicked");
        }
    }

    drop(joypad);
    for (strong, weak) in rumble_rx.try_iter() {
        log::info!("Rumble: strong={} weak={}", strong, weak);
    }
    log::info!("Joypad destroyed");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("rumblepad requires Linux uinput");
    std::process::exit(1);
}
