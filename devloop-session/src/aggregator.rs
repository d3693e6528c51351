//! Renders errors reported by any task.

use tokio::sync::mpsc;

use devloop_core::{Console, ReportedError, Shutdown};

/// Print each reported error under the control tag until cancelled.
pub async fn aggregate_errors(
    mut errors: mpsc::UnboundedReceiver<ReportedError>,
    console: Console,
    mut shutdown: Shutdown,
) {
    loop {
        let reported = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            reported = errors.recv() => reported,
        };
        let Some(reported) = reported else {
            return;
        };
        tracing::error!(context = %reported.context, error = %reported.message, "task error");
        console.control(format!("<error>error: {reported}</error>"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use devloop_core::testing::CapturedOutput;
    use devloop_core::{error_channel, shutdown_channel, CONTROL_TAG};

    #[tokio::test]
    async fn renders_reported_errors_until_cancelled() {
        let (captured, console) = CapturedOutput::console();
        let (reporter, rx) = error_channel();
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(aggregate_errors(rx, console, shutdown));

        reporter.report("sync add web:/app", "connection reset");
        tokio::task::yield_now().await;
        while captured.lines().is_empty() {
            tokio::task::yield_now().await;
        }
        trigger.trigger();
        task.await.expect("join");

        assert_eq!(
            captured.messages_for(CONTROL_TAG),
            ["<error>error: sync add web:/app: connection reset</error>"]
        );
    }

    #[tokio::test]
    async fn stops_when_every_reporter_is_gone() {
        let (_captured, console) = CapturedOutput::console();
        let (reporter, rx) = error_channel();
        let (_trigger, shutdown) = shutdown_channel();
        drop(reporter);
        aggregate_errors(rx, console, shutdown).await;
    }
}
