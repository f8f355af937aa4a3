use tracing::warn;

use tsbench_engine::StopSignal;

/// Exit code for a hard stop: a second signal arriving while the first
/// one's graceful drain is still in progress.
pub const HARD_STOP_EXIT_CODE: i32 = 105;

/// Trap INT/TERM: the first signal latches the stop flag so the pipeline
/// drains and exits on its own; a second one exits the process immediately.
pub fn spawn_signal_handler(stop: StopSignal) -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        let mut signals_seen = 0u32;
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }

            signals_seen += 1;
            if signals_seen == 1 {
                warn!("stop requested; finishing in-flight queries (signal again to exit immediately)");
                stop.request_stop();
            } else {
                warn!("stop requested again; exiting immediately");
                std::process::exit(HARD_STOP_EXIT_CODE);
            }
        }
    });
    Ok(())
}
