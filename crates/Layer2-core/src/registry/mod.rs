//! # Config Registry
//!
//! 스키마 타입 → 캐시 엔트리 매핑.
//!
//! ## 설계
//!
//! 1. **Lock-free read**: 테이블은 `ArcSwap`으로 보관하고 copy-on-write로 바꾼다.
//!    `get`은 테이블 포인터와 엔트리 스냅샷 포인터만 읽는다.
//! 2. **Fail fast**: `register`는 초기 로드가 성공해야 테이블에 넣는다.
//! 3. **Event-driven**: 등록/갱신/실패/해제를 broadcast 채널로 알린다.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ ConfigRegistry                                           │
//! │  ArcSwap<HashMap<TypeId, Arc<dyn ManagedEntry>>>         │
//! │   ├─ Binding<DatabaseConfig> ─► UpdateCoordinator ─► CacheEntry
//! │   └─ Binding<CacheConfig>    ─► UpdateCoordinator ─► CacheEntry
//! │                                                          │
//! │  ConfigSource ── on_change ──► coordinator.notify_change │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod binding;

use crate::events::ConfigEvent;
use crate::store::{CacheEntry, Snapshot, UpdateCoordinator};
use arc_swap::ArcSwap;
use binding::{summarize_value, Binding, ManagedEntry, Summarizer};
use chrono::{DateTime, Utc};
use nexus_foundation::{
    ConfigSource, Decoder, Error, NexusConfig, Result, SchemaDescriptor, SourceInfo, SourceKey,
};
use serde::Serialize;
use serde_json::Value;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

type Table = HashMap<TypeId, Arc<dyn ManagedEntry>>;

/// 등록된 설정 하나의 요약
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub descriptor: SchemaDescriptor,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ConfigRegistry
// ============================================================================

/// 스키마 레지스트리
pub struct ConfigRegistry {
    source: Arc<dyn ConfigSource>,
    decoder: Arc<dyn Decoder>,
    runtime: Handle,
    table: ArcSwap<Table>,
    /// register/unregister 직렬화
    registration: Mutex<()>,
    closed: AtomicBool,
    events: broadcast::Sender<ConfigEvent>,
}

impl ConfigRegistry {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        decoder: Arc<dyn Decoder>,
        runtime: Handle,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            source,
            decoder,
            runtime,
            table: ArcSwap::from_pointee(HashMap::new()),
            registration: Mutex::new(()),
            closed: AtomicBool::new(false),
            events,
        }
    }

    pub fn source(&self) -> &Arc<dyn ConfigSource> {
        &self.source
    }

    // ========================================================================
    // 등록 / 해제
    // ========================================================================

    /// 선언된 좌표로 등록하고 초기 값을 반환
    pub async fn register<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.register_descriptor::<T>(SchemaDescriptor::of::<T>(), None)
            .await
    }

    /// 선언된 좌표로 등록하고 `summaries()`에 포함시킨다
    pub async fn register_summarized<T: NexusConfig + Serialize>(&self) -> Result<Arc<T>> {
        self.register_descriptor::<T>(SchemaDescriptor::of::<T>(), Some(summarize_value::<T>))
            .await
    }

    /// 좌표를 바꿔서 등록
    pub async fn register_at<T: NexusConfig>(&self, key: SourceKey) -> Result<Arc<T>> {
        self.register_descriptor::<T>(SchemaDescriptor::of::<T>().with_key(key), None)
            .await
    }

    async fn register_descriptor<T: NexusConfig>(
        &self,
        descriptor: SchemaDescriptor,
        summarize: Option<Summarizer<T>>,
    ) -> Result<Arc<T>> {
        self.ensure_open()?;
        let _guard = self.registration.lock().await;
        self.ensure_open()?;

        let type_id = descriptor.type_id();
        let existing = self.table.load().get(&type_id).cloned();
        if let Some(existing) = existing {
            let registered = existing.descriptor().key();
            if registered == descriptor.key() {
                debug!("{} already registered", descriptor);
                return self.get::<T>();
            }
            return Err(Error::registration(
                descriptor.name(),
                Error::SchemaConflict {
                    schema: descriptor.name().to_string(),
                    registered: registered.clone(),
                    requested: descriptor.key().clone(),
                },
            ));
        }

        let entry = Arc::new(CacheEntry::<T>::new(descriptor.clone()));
        let coordinator = UpdateCoordinator::new(
            entry.clone(),
            self.source.clone(),
            self.decoder.clone(),
            self.runtime.clone(),
            self.events.clone(),
        );
        let binding: Arc<dyn ManagedEntry> = Arc::new(Binding::new(coordinator.clone(), summarize));

        // 초기 로드와 구독 사이의 변경을 놓치지 않도록 먼저 구독한다
        let subscription = self
            .source
            .subscribe(descriptor.key(), coordinator.change_callback())
            .map_err(|e| Error::registration(descriptor.name(), e))?;
        entry.set_subscription(subscription);

        let snapshot = match coordinator.run_now().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                binding.shutdown(self.source.as_ref());
                error!("Failed to register {}: {}", descriptor, e);
                return Err(Error::registration(descriptor.name(), e));
            }
        };

        self.table.rcu(|table| {
            let mut next = Table::clone(table);
            next.insert(type_id, binding.clone());
            next
        });

        // close와 겹쳤으면 방금 넣은 항목을 치운다
        if self.is_closed() {
            self.table.rcu(|table| {
                let mut next = Table::clone(table);
                next.remove(&type_id);
                next
            });
            binding.shutdown(self.source.as_ref());
            return Err(Error::Closed);
        }

        coordinator.activate();
        info!(
            schema = descriptor.name(),
            key = %descriptor.key(),
            revision = snapshot.revision(),
            "Registered config"
        );
        let _ = self
            .events
            .send(ConfigEvent::registered(&descriptor, snapshot.revision()));

        Ok(Arc::clone(snapshot.value()))
    }

    /// 등록 해제. 등록되어 있었으면 true
    pub async fn unregister<T: NexusConfig>(&self) -> bool {
        let _guard = self.registration.lock().await;
        let type_id = TypeId::of::<T>();

        let previous = self.table.rcu(|table| {
            let mut next = Table::clone(table);
            next.remove(&type_id);
            next
        });

        match previous.get(&type_id) {
            Some(binding) => {
                binding.shutdown(self.source.as_ref());
                info!("Unregistered config {}", binding.descriptor());
                let _ = self
                    .events
                    .send(ConfigEvent::unregistered(binding.descriptor()));
                true
            }
            None => {
                debug!("{} was not registered", type_name::<T>());
                false
            }
        }
    }

    // ========================================================================
    // 조회 / 갱신
    // ========================================================================

    /// 현재 값. 진행 중인 갱신을 기다리지 않는다
    pub fn get<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.snapshot::<T>().map(|s| Arc::clone(s.value()))
    }

    /// 현재 값과 revision
    pub fn snapshot<T: NexusConfig>(&self) -> Result<Arc<Snapshot<T>>> {
        let table = self.table.load();
        table
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.as_any().downcast_ref::<Binding<T>>())
            .and_then(|binding| binding.snapshot())
            .ok_or_else(|| Error::NotRegistered(type_name::<T>().to_string()))
    }

    /// 강제 갱신. single-flight 규칙은 그대로 적용된다
    pub async fn reload<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.ensure_open()?;
        let coordinator = self.coordinator::<T>()?;
        let snapshot = coordinator.run_now().await?;
        debug!(
            "Reloaded {} (revision {})",
            type_name::<T>(),
            snapshot.revision()
        );
        Ok(Arc::clone(snapshot.value()))
    }

    fn coordinator<T: NexusConfig>(&self) -> Result<Arc<UpdateCoordinator<T>>> {
        let table = self.table.load();
        table
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.as_any().downcast_ref::<Binding<T>>())
            .map(|binding| Arc::clone(binding.coordinator()))
            .ok_or_else(|| Error::NotRegistered(type_name::<T>().to_string()))
    }

    // ========================================================================
    // 상태
    // ========================================================================

    pub fn is_registered<T: NexusConfig>(&self) -> bool {
        self.table.load().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 등록된 설정 요약 (이름순)
    pub fn entries(&self) -> Vec<EntryStatus> {
        let table = self.table.load();
        let mut entries: Vec<EntryStatus> = table
            .values()
            .map(|entry| EntryStatus {
                descriptor: entry.descriptor().clone(),
                revision: entry.revision(),
                updated_at: entry.updated_at(),
            })
            .collect();
        entries.sort_by(|a, b| a.descriptor.name().cmp(b.descriptor.name()));
        entries
    }

    /// 스키마 이름 → revision
    pub fn revisions(&self) -> BTreeMap<String, u64> {
        self.table
            .load()
            .values()
            .map(|entry| (entry.descriptor().name().to_string(), entry.revision()))
            .collect()
    }

    /// 요약을 지원하는 스키마들의 현재 값 (민감 필드 가림, 이름순)
    pub fn summaries(&self) -> Result<BTreeMap<String, Value>> {
        let table = self.table.load();
        let mut summaries = BTreeMap::new();
        for entry in table.values() {
            if let Some(summary) = entry.summary() {
                summaries.insert(entry.descriptor().name().to_string(), summary?);
            }
        }
        Ok(summaries)
    }

    pub fn source_info(&self) -> SourceInfo {
        self.source.info()
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // 종료
    // ========================================================================

    /// 모든 구독 해제 후 소스를 닫는다. 여러 번 불려도 된다
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Config registry already closed");
            return;
        }

        let table = self.table.swap(Arc::new(HashMap::new()));
        for entry in table.values() {
            entry.shutdown(self.source.as_ref());
        }

        self.source.close();
        info!("Config registry closed ({} entries released)", table.len());
        let _ = self.events.send(ConfigEvent::Closed);
    }
}

impl Drop for ConfigRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

/// 모듈 경로를 뗀 스키마 이름
fn type_name<T: NexusConfig>() -> &'static str {
    SchemaDescriptor::of::<T>().name()
}
