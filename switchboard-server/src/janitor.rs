//! Periodic cleanup of dead sessions
//!
//! Session entries are normally removed by the stream's drop guard; the
//! janitor is the backstop for entries whose guard never ran (a stream
//! that was registered but never polled, a task killed mid-teardown). It
//! sweeps the registries for disconnected transports on a fixed cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info};

use crate::context::AppContext;

/// Sweep cadence
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sessions younger than this are left alone even when not yet connected,
/// covering the window between registration and the first stream poll
const MIN_AGE_SECONDS: i64 = 60;

/// Remove disconnected (or never-connected, stale) sessions from both maps
///
/// Returns how many entries were removed.
pub async fn sweep_sessions(ctx: &AppContext) -> usize {
    sweep_with_grace(ctx, ChronoDuration::seconds(MIN_AGE_SECONDS)).await
}

async fn sweep_with_grace(ctx: &AppContext, grace: ChronoDuration) -> usize {
    let mut removed = 0;
    let cutoff = Utc::now() - grace;

    let stale: Vec<_> = {
        let mut stale = Vec::new();
        for session_id in ctx.sessions.session_ids().await {
            if let Some(session) = ctx.sessions.get(session_id).await {
                if !session.is_connected() && session.created_at() < cutoff {
                    stale.push(session_id);
                }
            }
        }
        stale
    };

    for session_id in stale {
        ctx.drop_session(session_id).await;
        debug!(%session_id, "janitor removed stale session");
        removed += 1;
    }

    if removed > 0 {
        info!(removed, "session janitor sweep complete");
    }
    removed
}

/// Spawn the recurring sweep task
pub fn start(ctx: Arc<AppContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_sessions(&ctx).await;
        }
    })
}
