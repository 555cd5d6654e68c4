//! Background persistence of rotated session cookies.
//!
//! The upstream rotates `__Secure-1PSIDTS` (and occasionally the PSID)
//! inside the live session without telling anyone. This task polls the
//! session's cookie jar on a fixed cadence and writes changed values back
//! to the config file, so a restart picks up fresh credentials instead of
//! the stale pair the process originally started with.

use crate::client::ClientManager;
use crate::config::ConfigStore;
use crate::error::AppResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PERSIST_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn the persister loop. First write opportunity is one full interval
/// after startup. The loop exits when `shutdown` fires or its sender drops;
/// a tick already in progress runs to completion first.
pub fn spawn_cookie_persister(
    manager: Arc<ClientManager>,
    store: Arc<ConfigStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Cookie persister started (interval: {}s)",
            PERSIST_INTERVAL.as_secs()
        );
        loop {
            tokio::select! {
                () = tokio::time::sleep(PERSIST_INTERVAL) => {
                    if let Err(err) = persist_rotated_cookies(&manager, &store).await {
                        // Next tick retries; rotation loss only matters
                        // across a restart.
                        tracing::warn!("Failed to persist rotated cookies: {}", err);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Cookie persister stopped");
    })
}

/// One persister tick. Returns whether a config write happened.
pub async fn persist_rotated_cookies(
    manager: &ClientManager,
    store: &ConfigStore,
) -> AppResult<bool> {
    let Some(session) = manager.current_session().await else {
        return Ok(false);
    };
    let live = session.cookies();

    let cfg = store.snapshot().await;
    let psid_changed = !live.psid.is_empty() && live.psid != cfg.cookie_1psid;
    let psidts_changed = !live.psidts.is_empty() && live.psidts != cfg.cookie_1psidts;
    if !psid_changed && !psidts_changed {
        return Ok(false);
    }

    // Both values land in one atomic write even when only one rotated.
    store
        .update(|cfg| {
            if psid_changed {
                cfg.cookie_1psid = live.psid.clone();
            }
            if psidts_changed {
                cfg.cookie_1psidts = live.psidts.clone();
            }
        })
        .await?;

    tracing::info!(
        "Persisted rotated session cookies (psid changed: {}, psidts changed: {})",
        psid_changed,
        psidts_changed
    );
    Ok(true)
}
