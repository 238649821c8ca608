//! Watcher bookkeeping shared by all sources
//!
//! 구독 ID → (키, 콜백) 매핑. 같은 키에 여러 구독이 붙을 수 있다.

use nexus_foundation::{ChangeCallback, ChangeNotification, SourceKey, SubscriptionId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

struct Watcher {
    key: SourceKey,
    callback: ChangeCallback,
}

/// 구독 목록
pub struct WatcherSet {
    watchers: Mutex<HashMap<SubscriptionId, Watcher>>,
    next_id: AtomicU64,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self {
            watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 구독 추가
    pub fn add(&self, key: &SourceKey, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().insert(
            id,
            Watcher {
                key: key.clone(),
                callback,
            },
        );
        debug!("Registered watcher {} for {}", id, key);
        id
    }

    /// 구독 제거. 제거된 키 반환
    pub fn remove(&self, id: SubscriptionId) -> Option<SourceKey> {
        let removed = self.watchers.lock().remove(&id).map(|w| w.key);
        if let Some(ref key) = removed {
            debug!("Removed watcher {} for {}", id, key);
        }
        removed
    }

    /// 해당 키를 구독하는 콜백들
    pub fn callbacks_for(&self, key: &SourceKey) -> Vec<ChangeCallback> {
        self.watchers
            .lock()
            .values()
            .filter(|w| &w.key == key)
            .map(|w| w.callback.clone())
            .collect()
    }

    /// 구독 중인 고유 키 목록
    pub fn keys(&self) -> Vec<SourceKey> {
        let keys: BTreeSet<SourceKey> = self.watchers.lock().values().map(|w| w.key.clone()).collect();
        keys.into_iter().collect()
    }

    /// 해당 키에 남은 구독이 있는지
    pub fn is_watched(&self, key: &SourceKey) -> bool {
        self.watchers.lock().values().any(|w| &w.key == key)
    }

    /// 변경 알림 전달. 락을 잡은 채로 콜백을 부르지 않는다.
    pub fn notify(&self, key: &SourceKey, payload: &str) -> usize {
        let callbacks = self.callbacks_for(key);
        trace!("Notifying {} watcher(s) of {}", callbacks.len(), key);
        for callback in &callbacks {
            callback(ChangeNotification::new(key.clone(), payload));
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.watchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.watchers.lock().clear();
    }
}

impl Default for WatcherSet {
    fn default() -> Self {
        Self::new()
    }
}
