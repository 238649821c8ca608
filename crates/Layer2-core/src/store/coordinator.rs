//! Update Coordinator - 엔트리별 single-flight 갱신
//!
//! 갱신 사이클 하나 = `fetch → decode → install`.
//!
//! ## 동작
//!
//! - 요청(`request`)마다 티켓 번호가 1씩 증가한다
//! - 사이클은 시작할 때 그때까지의 요청 번호(`covers`)를 기록하고 fetch 한다
//! - 사이클이 도는 동안 들어온 요청은 끝난 뒤 한 번 더 도는 것으로 합쳐진다
//! - 대기자는 `covers >= ticket`인 사이클 결과를 받는다
//! - 동시에 두 사이클이 도는 일은 없다 (드라이버 태스크 하나)
//!
//! ```text
//! request(1) ──► [cycle covers=1] ──────────► report(1)
//! request(2)        ▲ running          └──► [cycle covers=3] ──► report(3)
//! request(3) ───────┘ (coalesced)
//! ```

use super::entry::{CacheEntry, Snapshot};
use crate::events::ConfigEvent;
use nexus_foundation::{
    decode_as, ChangeCallback, ChangeNotification, ConfigSource, Decoder, Error, NexusConfig,
    Result,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

/// 닫힌 뒤의 보고는 모든 티켓을 덮는다
const COVERS_ALL: u64 = u64::MAX;

/// 끝난 사이클 하나의 결과
struct CycleReport<T> {
    covers: u64,
    outcome: Result<Arc<Snapshot<T>>>,
}

#[derive(Default)]
struct FlightState {
    /// 지금까지 발급한 마지막 티켓
    requested: u64,
    /// 드라이버 태스크가 돌고 있는지
    running: bool,
}

/// 엔트리 하나의 갱신을 직렬화하는 코디네이터
pub struct UpdateCoordinator<T> {
    entry: Arc<CacheEntry<T>>,
    source: Arc<dyn ConfigSource>,
    decoder: Arc<dyn Decoder>,
    runtime: Handle,
    state: Mutex<FlightState>,
    reports: watch::Sender<Option<Arc<CycleReport<T>>>>,
    events: broadcast::Sender<ConfigEvent>,
    /// 등록 완료 전에는 이벤트를 내보내지 않는다
    active: AtomicBool,
}

impl<T: NexusConfig> UpdateCoordinator<T> {
    pub fn new(
        entry: Arc<CacheEntry<T>>,
        source: Arc<dyn ConfigSource>,
        decoder: Arc<dyn Decoder>,
        runtime: Handle,
        events: broadcast::Sender<ConfigEvent>,
    ) -> Arc<Self> {
        let (reports, _) = watch::channel(None);
        Arc::new(Self {
            entry,
            source,
            decoder,
            runtime,
            state: Mutex::new(FlightState::default()),
            reports,
            events,
            active: AtomicBool::new(false),
        })
    }

    pub fn entry(&self) -> &Arc<CacheEntry<T>> {
        &self.entry
    }

    /// 이후 사이클 결과를 이벤트로 알린다
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// 사이클 예약. 드라이버가 없으면 띄운다. 발급된 티켓 반환
    pub fn request(self: &Arc<Self>) -> u64 {
        let (ticket, spawn) = {
            let mut state = self.state.lock();
            state.requested += 1;
            let spawn = !state.running;
            state.running = true;
            (state.requested, spawn)
        };

        if spawn {
            let this = Arc::clone(self);
            self.runtime.spawn(async move { this.drive().await });
        }

        ticket
    }

    /// 사이클을 예약하고 그 요청을 덮는 결과를 기다린다
    pub async fn run_now(self: &Arc<Self>) -> Result<Arc<Snapshot<T>>> {
        // 요청 전에 구독해야 보고를 놓치지 않는다
        let mut reports = self.reports.subscribe();
        let ticket = self.request();

        let report = {
            let guard = reports
                .wait_for(|r| r.as_ref().is_some_and(|r| r.covers >= ticket))
                .await
                .map_err(|_| Error::Closed)?;
            (*guard).clone()
        };

        match report {
            Some(report) => report.outcome.clone(),
            None => Err(Error::Closed),
        }
    }

    /// 변경 알림 처리: 예약만 하고 바로 돌아온다
    pub fn notify_change(self: &Arc<Self>) {
        let ticket = self.request();
        trace!(
            "Change scheduled for {} (ticket {})",
            self.entry.descriptor(),
            ticket
        );
    }

    /// 어댑터에 넘길 콜백. 코디네이터를 약하게 잡는다
    pub fn change_callback(self: &Arc<Self>) -> ChangeCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |notification: ChangeNotification| {
            if let Some(coordinator) = weak.upgrade() {
                debug!(
                    "Change notification for {} ({} bytes)",
                    notification.key,
                    notification.payload.len()
                );
                coordinator.notify_change();
            }
        })
    }

    /// 엔트리를 닫는다. 진행 중인 사이클 결과는 버려지고 대기자는 Closed를 받는다
    pub fn close(&self) {
        if self.entry.close() {
            debug!("Closed cache entry {}", self.entry.descriptor());
        }
    }

    // ========================================================================
    // 드라이버
    // ========================================================================

    async fn drive(self: Arc<Self>) {
        loop {
            if self.entry.is_closed() {
                self.publish(COVERS_ALL, Err(Error::Closed));
                self.state.lock().running = false;
                return;
            }

            let covers = self.state.lock().requested;
            let outcome = self.cycle().await;
            self.publish(covers, outcome);

            if !self.finish_or_continue(covers) {
                return;
            }
        }
    }

    /// 사이클 뒤에 쌓인 요청이 있으면 true, 없으면 running을 내리고 false
    fn finish_or_continue(&self, covers: u64) -> bool {
        let mut state = self.state.lock();
        if state.requested > covers {
            true
        } else {
            state.running = false;
            false
        }
    }

    async fn cycle(&self) -> Result<Arc<Snapshot<T>>> {
        let key = self.entry.descriptor().key();
        let raw = self.source.fetch(key).await?;
        let value: T = decode_as(self.decoder.as_ref(), key, &raw)?;
        self.entry.install(value)
    }

    fn publish(&self, covers: u64, outcome: Result<Arc<Snapshot<T>>>) {
        let descriptor = self.entry.descriptor();
        let active = self.active.load(Ordering::SeqCst);

        match &outcome {
            Ok(snapshot) => {
                debug!(
                    schema = descriptor.name(),
                    key = %descriptor.key(),
                    revision = snapshot.revision(),
                    "Config updated"
                );
                if active {
                    let _ = self
                        .events
                        .send(ConfigEvent::updated(descriptor, snapshot.revision()));
                }
            }
            Err(Error::Closed) => {
                debug!("Discarded refresh result for closed entry {}", descriptor);
            }
            Err(e) => {
                warn!(
                    schema = descriptor.name(),
                    key = %descriptor.key(),
                    revision = self.entry.revision(),
                    "Config refresh failed, keeping last good value: {}",
                    e
                );
                if active {
                    let _ = self.events.send(ConfigEvent::refresh_failed(descriptor, e));
                }
            }
        }

        self.reports
            .send_replace(Some(Arc::new(CycleReport { covers, outcome })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_foundation::{FormatDecoder, SchemaDescriptor, SourceKey};
    use nexus_provider::MemorySource;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Limits {
        max: u32,
    }

    nexus_foundation::nexus_config!(Limits, data_id = "limits.json");

    fn setup(payload: &str) -> (Arc<MemorySource>, Arc<UpdateCoordinator<Limits>>) {
        let key = SourceKey::in_default_group("limits.json");
        let source = Arc::new(MemorySource::new().with_document(key, payload));
        let entry = Arc::new(CacheEntry::new(SchemaDescriptor::of::<Limits>()));
        let (events, _) = broadcast::channel(16);
        let coordinator = UpdateCoordinator::new(
            entry,
            source.clone(),
            Arc::new(FormatDecoder::new()),
            Handle::current(),
            events,
        );
        (source, coordinator)
    }

    #[tokio::test]
    async fn test_run_now_installs() {
        let (_, coordinator) = setup(r#"{"max": 10}"#);

        let snapshot = coordinator.run_now().await.unwrap();
        assert_eq!(snapshot.revision(), 1);
        assert_eq!(coordinator.entry().load().unwrap().max, 10);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_value() {
        let (source, coordinator) = setup(r#"{"max": 10}"#);
        coordinator.run_now().await.unwrap();

        source.put_silently(&SourceKey::in_default_group("limits.json"), r#"{"max": "many"}"#);
        let err = coordinator.run_now().await.unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));

        assert_eq!(coordinator.entry().load().unwrap().max, 10);
        assert_eq!(coordinator.entry().revision(), 1);
    }

    #[tokio::test]
    async fn test_closed_coordinator_reports_closed() {
        let (_, coordinator) = setup(r#"{"max": 10}"#);
        coordinator.run_now().await.unwrap();

        coordinator.close();
        assert!(matches!(coordinator.run_now().await, Err(Error::Closed)));
        assert_eq!(coordinator.entry().revision(), 1);
    }

    #[tokio::test]
    async fn test_change_callback_schedules() {
        let (source, coordinator) = setup(r#"{"max": 1}"#);
        coordinator.run_now().await.unwrap();

        let key = SourceKey::in_default_group("limits.json");
        source.subscribe(&key, coordinator.change_callback()).unwrap();
        source.put(&key, r#"{"max": 2}"#);

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while coordinator.entry().revision() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("update not applied");

        assert_eq!(coordinator.entry().load().unwrap().max, 2);
    }
}
