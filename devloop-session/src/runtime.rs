//! Blocking entry point and tracing setup for a dev session.

use devloop_core::shutdown_channel;

use crate::error::{io_err, SessionError};
use crate::session::{Session, StartOptions};

/// Run `session` on a fresh runtime, blocking until ctrl-c ends it.
pub fn start_blocking(session: Session, opts: StartOptions) -> Result<(), SessionError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let (trigger, shutdown) = shutdown_channel();
        let signal = {
            let trigger = trigger.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("received ctrl-c, stopping session"),
                    Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
                }
                trigger.trigger();
            })
        };

        let result = session.run(opts, shutdown).await;
        signal.abort();
        result
    })
}

/// Install the diagnostics subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
