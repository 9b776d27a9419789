use crate::models::agent::Agent;
use crate::models::order::Order;

/// Candidate ordering is a pluggable strategy; the coordinator's claim loop
/// only requires *some* total order over the eligible pool. Swapping in a
/// distance- or fairness-based policy does not touch the concurrency path.
pub trait RankingPolicy: Send + Sync {
    fn rank(&self, candidates: &mut [Agent], order: &Order);
}

/// Reference policy: fewest active orders first, ties broken by the most
/// recently seen agent (prefer agents that are currently responsive).
pub struct FewestActiveOrders;

impl RankingPolicy for FewestActiveOrders {
    fn rank(&self, candidates: &mut [Agent], _order: &Order) {
        candidates.sort_by(|a, b| {
            a.active_orders
                .cmp(&b.active_orders)
                .then(b.last_seen.cmp(&a.last_seen))
        });
    }
}
