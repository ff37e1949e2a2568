use log::{debug, info, warn};
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};

use crate::{events::PresenceEvent, sessions::SessionError, BeaconContext};

/// Periodically finalizes sessions that stopped updating. Runs until
/// shutdown is signalled; an in-flight sweep always completes first.
pub async fn run_reaper(context: BeaconContext, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(context.config.reap_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(&context).await,
            _ = shutdown.changed() => break,
        }
    }

    debug!("Reaper stopped");
}

/// One sweep over the session table. Every stale session goes through the
/// same finalize path an explicit disconnect takes, one at a time, so a
/// racing update can still save a session the sweep has not reached yet.
pub async fn sweep(context: &BeaconContext) {
    let stale = context.sessions.stale_tokens();
    let mut evicted = 0usize;

    for token in stale {
        match context.finalize_session(&token).await {
            Ok(duration) => {
                info!("Evicted stale session {token} after {duration}s");
                evicted += 1;
            }
            // A racing disconnect got there first, nothing left to do
            Err(SessionError::NotFound { .. }) => {}
            Err(e) => warn!("Failed to evict stale session {token}: {e}"),
        }
    }

    context.stats.prune_versions(context.clock.now());

    if evicted > 0 {
        context.publish(PresenceEvent::Cleanup);
    }
}
