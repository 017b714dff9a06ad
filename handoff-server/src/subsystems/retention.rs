//! Retention sweeper
//!
//! Background job that keeps the session table honest:
//! - flips `is_active` off for sessions past `expires_at`
//! - deletes sessions (and their messages) once they have been expired for
//!   longer than `retention.purge_after_minutes`
//!
//! Liveness never depends on this job having run. Reads and appends check
//! `expires_at` themselves; the sweep only reclaims space and codes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use handoff_core::config::{RetentionConfig, MAX_MINUTES};
use handoff_core::{PairingStore, SweepReport};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Sessions that expired at or before this instant are purged.
pub fn purge_cutoff(now: DateTime<Utc>, config: &RetentionConfig) -> DateTime<Utc> {
    now - chrono::Duration::minutes(config.purge_after_minutes.min(MAX_MINUTES) as i64)
}

/// Run a single sweep against `store`.
pub async fn run_retention_sweep(
    store: &dyn PairingStore,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let purge_before = purge_cutoff(now, config);
    let report = store.sweep(purge_before).await?;

    if report == SweepReport::default() {
        tracing::debug!(store = store.name(), "Retention sweep: nothing to do");
    } else {
        tracing::info!(
            store = store.name(),
            deactivated = report.sessions_deactivated,
            sessions_purged = report.sessions_purged,
            messages_purged = report.messages_purged,
            "Retention sweep complete"
        );
    }

    Ok(report)
}

/// Called from main.rs to start the background retention loop
pub async fn run_retention_loop(
    store: Arc<dyn PairingStore>,
    config: RetentionConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = tokio::time::Duration::from_secs(config.interval_minutes.clamp(1, MAX_MINUTES) * 60);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Retention loop started (interval: {}min, purge after: {}min)",
        config.interval_minutes,
        config.purge_after_minutes
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_retention_sweep(store.as_ref(), &config, Utc::now()).await {
                    tracing::warn!("Retention sweep error (non-fatal): {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Retention loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
