use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Span, field};

use super::TraceId;

/// Root span for one scheduler tick (or any other top-level job).
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        ticker = field::Empty
    )
}

/// Child span; inherits `trace_id` from the enclosing root span.
/// `ticker` is recorded by the caller once known.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name, ticker = field::Empty)
}

/// Awaits `fut` and emits a `performance` warning if it took longer than `max`.
/// Measured on the tokio clock, so paused-time tests see virtual elapsed time.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn slow_future_is_reported() {
        let out = warn_if_slow("sleepy", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            7
        })
        .await;

        assert_eq!(out, 7);
        assert!(logs_contain("slow operation detected"));
    }

    #[tokio::test]
    #[traced_test]
    async fn fast_future_is_silent() {
        let out = warn_if_slow("quick", Duration::from_secs(5), async { 1 }).await;

        assert_eq!(out, 1);
        assert!(!logs_contain("slow operation detected"));
    }
}
