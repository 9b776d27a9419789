use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest {
    pub order_id: Uuid,
}

pub async fn enqueue_dispatch(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    state
        .dispatch_tx
        .send(DispatchRequest { order_id })
        .await
        .map_err(|err| AppError::Internal(format!("dispatch queue send failed: {err}")))?;

    state.metrics.orders_in_dispatch_queue.inc();
    Ok(())
}

/// Non-blocking variant for background tasks; a full queue means the order
/// is simply picked up on a later cycle.
pub fn try_enqueue_dispatch(state: &AppState, order_id: Uuid) -> bool {
    if state
        .dispatch_tx
        .try_send(DispatchRequest { order_id })
        .is_ok()
    {
        state.metrics.orders_in_dispatch_queue.inc();
        true
    } else {
        false
    }
}
