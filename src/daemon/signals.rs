//! OS signal handling.
//!
//! SIGINT/SIGTERM request shutdown. SIGHUP queues a reload for the event
//! loop; discovery itself never runs in the signal task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Queue a reload, coalescing with one already pending.
pub fn request_reload(reload: &mpsc::Sender<()>) {
    match reload.try_send(()) {
        Ok(()) => {}
        Err(TrySendError::Full(())) => debug!("Reload already pending"),
        Err(TrySendError::Closed(())) => debug!("Event loop gone, reload ignored"),
    }
}

#[cfg(unix)]
pub fn spawn_listener(
    shutdown: CancellationToken,
    reload: mpsc::Sender<()>,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    shutdown.cancel();
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    shutdown.cancel();
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading services");
                    request_reload(&reload);
                }
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_listener(
    shutdown: CancellationToken,
    _reload: mpsc::Sender<()>,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C");
        shutdown.cancel();
    }))
}
