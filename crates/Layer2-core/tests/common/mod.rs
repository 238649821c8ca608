//! 통합 테스트 공용 도구

#![allow(dead_code)]

use async_trait::async_trait;
use nexus_core::{Result, SourceKey};
use nexus_foundation::{ChangeCallback, ConfigSource, SourceInfo, SubscriptionId};
use nexus_provider::MemorySource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG`로 테스트 로그 확인
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// fetch마다 지연을 넣고 동시 fetch 수를 기록하는 소스
pub struct SlowSource {
    pub inner: MemorySource,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemorySource::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_document(mut self, key: SourceKey, payload: &str) -> Self {
        self.inner = self.inner.with_document(key, payload);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> u64 {
        self.inner.fetch_count()
    }
}

#[async_trait]
impl ConfigSource for SlowSource {
    fn name(&self) -> &str {
        "Slow"
    }

    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn fetch(&self, key: &SourceKey) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // 지연 전에 읽어서 "fetch가 이미 소스 상태를 읽은 뒤" 상황을 만든다
        let result = self.inner.fetch(key).await;
        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn subscribe(&self, key: &SourceKey, on_change: ChangeCallback) -> Result<SubscriptionId> {
        self.inner.subscribe(key, on_change)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn info(&self) -> SourceInfo {
        self.inner.info()
    }
}

/// 조건이 참이 될 때까지 기다린다
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
