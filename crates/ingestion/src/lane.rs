//! Per-entity lanes: one active unit of work per key.
//!
//! Lanes live in an arena keyed by entity. An entry exists only while some
//! caller holds or waits on it, so the map does not grow with the number of
//! tokens ever seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use events::{EventEnvelope, EventPayload, MemecoinAddress, TxHash};
use tokio::sync::{Mutex as LaneMutex, OwnedMutexGuard};

/// Identity of the entity an envelope mutates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneKey(String);

impl LaneKey {
    pub fn address(address: &MemecoinAddress) -> Self {
        Self(format!("address:{address}"))
    }

    pub fn transaction(hash: &TxHash) -> Self {
        Self(format!("tx:{hash}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LaneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The lanes an envelope must hold while it is applied.
///
/// Every kind holds its memecoin address; launches also hold their
/// transaction hash, the launch record's primary key.
pub fn lane_keys(envelope: &EventEnvelope) -> Vec<LaneKey> {
    let mut keys = vec![LaneKey::address(envelope.memecoin_address())];
    if let EventPayload::LaunchCreated(launch) = envelope.payload() {
        keys.push(LaneKey::transaction(&launch.transaction_hash));
    }
    keys
}

/// Arena of FIFO lanes keyed by entity.
#[derive(Debug, Default)]
pub struct LaneMap {
    lanes: Mutex<HashMap<LaneKey, Arc<LaneMutex<()>>>>,
    contended: AtomicU64,
}

impl LaneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every lane in `keys`.
    ///
    /// Keys are sorted and deduplicated first, so two callers asking for
    /// overlapping sets always lock in the same order.
    pub async fn acquire(&self, mut keys: Vec<LaneKey>) -> LaneGuard<'_> {
        keys.sort();
        keys.dedup();

        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            let lane = {
                let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
                lanes.entry(key.clone()).or_default().clone()
            };
            let guard = match lane.clone().try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    self.contended.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(lane = %key, "waiting for lane");
                    lane.lock_owned().await
                }
            };
            held.push((key, guard));
        }

        LaneGuard { map: self, held }
    }

    /// Number of acquisitions that had to wait for another holder.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Number of lanes currently held or awaited.
    pub fn active(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: &LaneKey) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the arena's own reference left: nobody holds or awaits it.
        if let Some(lane) = lanes.get(key)
            && Arc::strong_count(lane) == 1
        {
            lanes.remove(key);
        }
    }
}

/// Holds a set of lanes; releases them, in reverse order, on drop.
pub struct LaneGuard<'a> {
    map: &'a LaneMap,
    held: Vec<(LaneKey, OwnedMutexGuard<()>)>,
}

impl LaneGuard<'_> {
    pub fn keys(&self) -> impl Iterator<Item = &LaneKey> {
        self.held.iter().map(|(key, _)| key)
    }
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        while let Some((key, guard)) = self.held.pop() {
            drop(guard);
            self.map.release(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use events::{EventEnvelope, LaunchCreated, LiquidityAdded};

    #[test]
    fn launch_holds_address_and_hash() {
        let envelope = EventEnvelope::builder()
            .transfer_id("t-1")
            .payload(EventPayload::LaunchCreated(LaunchCreated {
                transaction_hash: TxHash::new("0xt1"),
                memecoin_address: MemecoinAddress::new("0xa"),
                owner_address: "0xowner".to_string(),
                quote_token: None,
                total_supply: "1".to_string(),
            }))
            .build()
            .unwrap();
        let keys: Vec<_> = lane_keys(&envelope)
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["address:0xa", "tx:0xt1"]);

        let envelope = EventEnvelope::builder()
            .transfer_id("t-2")
            .payload(EventPayload::LiquidityAdded(LiquidityAdded {
                memecoin_address: MemecoinAddress::new("0xa"),
                quote_token: None,
                amount: None,
            }))
            .build()
            .unwrap();
        assert_eq!(lane_keys(&envelope).len(), 1);
    }

    #[tokio::test]
    async fn lanes_are_reclaimed_after_release() {
        let lanes = LaneMap::new();
        {
            let guard = lanes
                .acquire(vec![
                    LaneKey::transaction(&TxHash::new("0xt")),
                    LaneKey::address(&MemecoinAddress::new("0xa")),
                ])
                .await;
            let keys: Vec<_> = guard.keys().map(|k| k.as_str().to_string()).collect();
            assert_eq!(keys, vec!["address:0xa", "tx:0xt"]);
            assert_eq!(lanes.active(), 2);
        }
        assert_eq!(lanes.active(), 0);
        assert_eq!(lanes.contended(), 0);
    }

    #[tokio::test]
    async fn duplicate_keys_do_not_self_deadlock() {
        let lanes = LaneMap::new();
        let key = LaneKey::address(&MemecoinAddress::new("0xa"));
        let _guard = lanes.acquire(vec![key.clone(), key]).await;
        assert_eq!(lanes.active(), 1);
    }

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let lanes = Arc::new(LaneMap::new());
        let key = LaneKey::address(&MemecoinAddress::new("0xa"));

        let guard = lanes.acquire(vec![key.clone()]).await;

        let waiter = {
            let lanes = Arc::clone(&lanes);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = lanes.acquire(vec![key]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(lanes.contended(), 1);
        assert_eq!(lanes.active(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let lanes = LaneMap::new();
        let a = lanes
            .acquire(vec![LaneKey::address(&MemecoinAddress::new("0xa"))])
            .await;
        let b = lanes
            .acquire(vec![LaneKey::address(&MemecoinAddress::new("0xb"))])
            .await;
        assert_eq!(lanes.contended(), 0);
        drop((a, b));
    }
}
