use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::engine::dispatch::revert_claim;
use crate::engine::queue::try_enqueue_dispatch;
use crate::error::AppError;
use crate::models::offer::OfferOutcome;
use crate::models::order::{Actor, OrderStatus};
use crate::state::AppState;
use crate::store::StoreError;

/// Background reaper: reverts offers past their deadline and re-circulates
/// idle pending orders. Every step is guarded by a single-winner primitive
/// (offer finalize, order CAS), so running several instances is safe.
pub async fn run_offer_reaper(state: Arc<AppState>) {
    let mut ticker = interval(state.config.reaper_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("offer reaper started");

    loop {
        ticker.tick().await;
        if let Err(err) = sweep(&state).await {
            error!(error = %err, "reaper sweep failed");
        }
    }
}

/// One reaper pass. Public so tests can drive it without waiting on a timer.
pub async fn sweep(state: &AppState) -> Result<(), AppError> {
    let now = Utc::now();

    for offer in state.offers.expired_before(now) {
        let order = match state.orders.get(offer.order_id) {
            Ok(order) => order,
            Err(StoreError::NotFound) => {
                state.offers.finalize(offer.order_id, OfferOutcome::Revoked);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        // Only the exact claim this offer belongs to may be reverted; if the
        // order moved on (accept, cancel), the winner settles the offer.
        if order.status != OrderStatus::Assigned
            || order.assigned_agent != Some(offer.agent_id)
            || order.version != offer.order_version
        {
            continue;
        }

        match revert_claim(state, &order, OfferOutcome::Expired, Actor::System).await? {
            Some(reverted) => {
                state.metrics.offers_expired_total.inc();
                info!(
                    order_id = %reverted.id,
                    agent_id = %offer.agent_id,
                    reassignments = reverted.reassignments,
                    "offer expired; order reverted to pending"
                );
            }
            None => {} // lost to a concurrent writer; nothing to do
        }
    }

    // Pendings nobody is working on (no candidates last cycle, engine
    // restart) get another dispatch cycle, unless held for manual dispatch.
    let idle_cutoff = now
        - Duration::from_std(state.config.reaper_interval).unwrap_or_else(|_| Duration::seconds(1));
    for order in state.orders.list_pending(None) {
        if !order.needs_attention && order.updated_at <= idle_cutoff {
            try_enqueue_dispatch(state, order.id);
        }
    }

    Ok(())
}
