// ccnx-play: reference host for ccnx-access. Drives the pull loop and writes the stream out.

mod config;
mod location;
mod player;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CANCEL_GRACE: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let access = ccnx_access::config::load();
    let opts = match config::parse_args(std::env::args().skip(1), access)? {
        config::Command::Version => {
            println!("ccnx-play {} (protocol {})", VERSION, ccnx_access::PROTOCOL_VERSION);
            return Ok(());
        }
        config::Command::Help => {
            println!("{}", config::USAGE);
            return Ok(());
        }
        config::Command::Play(opts) => opts,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let worker_cancel = cancel.clone();
        let worker = tokio::task::spawn_blocking(move || player::run(opts, &worker_cancel));
        supervise(worker, &cancel, shutdown_signal(), CANCEL_GRACE).await
    });
    // A pull waiting on a silent producer never returns; don't wait for it.
    rt.shutdown_timeout(Duration::from_secs(1));

    match result? {
        Some(summary) => log::info!(
            "played {} bytes in {} blocks ({} empty pulls), position {}, eof {}",
            summary.bytes,
            summary.blocks,
            summary.empty_pulls,
            summary.end_position,
            summary.eof
        ),
        None => log::warn!("stopped while a pull was still blocked; no summary"),
    }
    Ok(())
}

/// Wait for the player or a shutdown signal. On shutdown the player is asked to stop
/// and given `grace` to hand back what it delivered. None: it stayed blocked in a pull.
async fn supervise<F>(
    mut worker: JoinHandle<anyhow::Result<player::Summary>>,
    cancel: &AtomicBool,
    shutdown: F,
    grace: Duration,
) -> anyhow::Result<Option<player::Summary>>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let first = tokio::select! {
        joined = &mut worker => Ok(joined),
        signal = shutdown => Err(signal),
    };
    let joined = match first {
        Ok(joined) => joined,
        Err(Err(e)) => return Err(e),
        Err(Ok(())) => {
            log::info!("shutdown requested, stopping after the current pull");
            cancel.store(true, Ordering::Relaxed);
            match tokio::time::timeout(grace, worker).await {
                Ok(joined) => joined,
                Err(_) => return Ok(None),
            }
        }
    };
    match joined {
        Ok(played) => played.map(Some),
        Err(e) => Err(anyhow::Error::from(e)),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
