//! LivePositions: last known deliverer position per active delivery
//!
//! ```text
//! POST /api/deliveries/{id}/position
//!       │ store in delivery_positions, then
//!       ▼
//! LivePositions (delivery_id → DeliveryPosition)
//!       │
//!       └── GET /api/deliveries/{id}/live, GET /api/tracking/{code}
//! ```
//!
//! The cache is a read accelerator only. A miss falls back to the latest
//! stored row, and terminal deliveries are evicted.

use dashmap::DashMap;
use shared::models::DeliveryPosition;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct LivePositions {
    positions: Arc<DashMap<i64, DeliveryPosition>>,
}

impl LivePositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a position, ignoring fixes older than the cached one
    pub fn update(&self, position: DeliveryPosition) {
        self.positions
            .entry(position.delivery_id)
            .and_modify(|current| {
                if position.recorded_at >= current.recorded_at {
                    *current = position;
                }
            })
            .or_insert(position);
    }

    pub fn get(&self, delivery_id: i64) -> Option<DeliveryPosition> {
        self.positions.get(&delivery_id).map(|p| *p)
    }

    pub fn evict(&self, delivery_id: i64) {
        self.positions.remove(&delivery_id);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(delivery_id: i64, recorded_at: i64) -> DeliveryPosition {
        DeliveryPosition {
            delivery_id,
            latitude: 48.85,
            longitude: 2.35,
            recorded_at,
        }
    }

    #[test]
    fn test_keeps_latest_fix() {
        let live = LivePositions::new();
        live.update(pos(1, 200));
        live.update(pos(1, 100));
        assert_eq!(live.get(1).map(|p| p.recorded_at), Some(200));
        live.update(pos(1, 300));
        assert_eq!(live.get(1).map(|p| p.recorded_at), Some(300));
    }

    #[test]
    fn test_evict() {
        let live = LivePositions::new();
        live.update(pos(1, 1));
        live.update(pos(2, 1));
        live.evict(1);
        assert!(live.get(1).is_none());
        assert_eq!(live.len(), 1);
    }
}
