// src/pipeline/schedule.rs

//! Periodic trigger for change-detection sessions.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::pipeline::session::Watcher;

/// When and for whom to run checks.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub interval: Duration,
    pub caller: String,
    pub destination: String,
    /// Stop after this many started sessions
    pub max_runs: Option<usize>,
}

/// Start a session on every tick until `shutdown` fires.
///
/// A tick that finds the caller's previous session still running is
/// skipped. Sessions get a child of `shutdown`, so shutting down also
/// cancels the session in flight; it is awaited before returning.
/// Returns the number of sessions started.
pub async fn run_schedule(
    watcher: &Watcher,
    schedule: &Schedule,
    shutdown: &CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sessions = JoinSet::new();
    let mut started = 0;

    log::info!(
        "[Schedule] Checking every {}s for {}",
        schedule.interval.as_secs(),
        schedule.caller
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match watcher.begin(&schedule.caller, &schedule.destination) {
            Ok(session) => {
                let mut session = session.with_cancel_token(shutdown.child_token());
                started += 1;
                sessions.spawn(async move {
                    // Failures are already logged by the session.
                    let _ = session.run().await;
                });
            }
            Err(e) => log::warn!("[Schedule] Skipping tick: {}", e),
        }

        if schedule.max_runs.is_some_and(|max| started >= max) {
            break;
        }
    }

    while sessions.join_next().await.is_some() {}
    log::info!("[Schedule] Stopped after {} runs", started);
    started
}
