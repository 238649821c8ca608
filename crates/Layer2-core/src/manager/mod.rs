//! # Config Manager
//!
//! 애플리케이션이 직접 쓰는 얇은 파사드. 소스 연결을 소유하고
//! 레지스트리에 위임한다. 전역 싱글톤은 없다: 필요한 곳에 명시적으로 넘긴다.
//!
//! ```ignore
//! use nexus_core::{schema, ConfigManager};
//! use nexus_provider::FileSourceConfig;
//!
//! let manager = ConfigManager::with_file(FileSourceConfig::new("configs")).await?;
//! manager.register_all([schema::<DatabaseConfig>(), schema::<CacheConfig>()]).await?;
//!
//! let db = manager.get_config::<DatabaseConfig>()?;
//! println!("{}:{}", db.host, db.port);
//!
//! manager.close();
//! ```

mod builder;

pub use builder::{ManagerBuilder, DEFAULT_EVENT_CAPACITY};

use crate::events::ConfigEvent;
use crate::registry::{ConfigRegistry, EntryStatus};
use crate::store::Snapshot;
use futures::future::BoxFuture;
use nexus_foundation::{
    redact_sensitive, ConfigSource, NexusConfig, Result, SchemaDescriptor, SourceInfo, SourceKey,
};
use nexus_provider::{FileSource, FileSourceConfig, NacosSource, NacosSourceConfig, SourceConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

// ============================================================================
// SchemaHandle - register_all 인자
// ============================================================================

/// 타입을 지운 등록 요청
pub struct SchemaHandle {
    descriptor: SchemaDescriptor,
    register: for<'a> fn(&'a ConfigRegistry) -> BoxFuture<'a, Result<()>>,
}

impl SchemaHandle {
    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }
}

/// `register_all`에 넘길 스키마
pub fn schema<T: NexusConfig>() -> SchemaHandle {
    SchemaHandle {
        descriptor: SchemaDescriptor::of::<T>(),
        register: register_erased::<T>,
    }
}

/// `register_all`에 넘길 스키마. `all_config_summaries()`에도 포함된다
pub fn summarized_schema<T: NexusConfig + Serialize>() -> SchemaHandle {
    SchemaHandle {
        descriptor: SchemaDescriptor::of::<T>(),
        register: register_summarized_erased::<T>,
    }
}

fn register_erased<T: NexusConfig>(registry: &ConfigRegistry) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { registry.register::<T>().await.map(|_| ()) })
}

fn register_summarized_erased<T: NexusConfig + Serialize>(
    registry: &ConfigRegistry,
) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { registry.register_summarized::<T>().await.map(|_| ()) })
}

// ============================================================================
// ManagerInfo
// ============================================================================

/// 매니저 상태 정보
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerInfo {
    pub source: SourceInfo,
    pub registered_count: usize,
    /// 등록된 스키마 이름 (정렬됨)
    pub config_names: Vec<String>,
    pub revisions: BTreeMap<String, u64>,
    pub closed: bool,
}

// ============================================================================
// ConfigManager
// ============================================================================

/// 설정 매니저
pub struct ConfigManager {
    registry: ConfigRegistry,
}

impl ConfigManager {
    pub fn builder(source: Arc<dyn ConfigSource>) -> ManagerBuilder {
        ManagerBuilder::new(source)
    }

    /// 기본 옵션으로 소스에 연결
    pub async fn connect(source: Arc<dyn ConfigSource>) -> Result<Self> {
        Self::builder(source).build().await
    }

    /// 파일 소스로 연결
    pub async fn with_file(config: FileSourceConfig) -> Result<Self> {
        Self::connect(Arc::new(FileSource::new(config))).await
    }

    /// Nacos 소스로 연결
    pub async fn with_nacos(config: NacosSourceConfig) -> Result<Self> {
        Self::connect(Arc::new(NacosSource::new(config)?)).await
    }

    /// 선언된 소스 설정으로 연결
    pub async fn from_source_config(config: &SourceConfig) -> Result<Self> {
        Self::connect(config.build()?).await
    }

    pub(crate) fn from_registry(registry: ConfigRegistry) -> Self {
        Self { registry }
    }

    /// 매니저를 만들어 `f`에 넘기고, 어떤 경로로 끝나든 닫는다
    pub async fn scoped<F, Fut, R>(source: Arc<dyn ConfigSource>, f: F) -> Result<R>
    where
        F: FnOnce(Arc<ConfigManager>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let manager = Arc::new(Self::connect(source).await?);
        let result = f(Arc::clone(&manager)).await;
        manager.close();
        result
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 스키마 등록 (초기 로드 포함). 같은 스키마 재등록은 no-op
    pub async fn register<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.registry.register::<T>().await
    }

    /// 등록하고 `all_config_summaries()`에 포함시킨다
    pub async fn register_summarized<T: NexusConfig + Serialize>(&self) -> Result<Arc<T>> {
        self.registry.register_summarized::<T>().await
    }

    /// 다른 좌표로 등록
    pub async fn register_at<T: NexusConfig>(&self, key: SourceKey) -> Result<Arc<T>> {
        self.registry.register_at::<T>(key).await
    }

    /// 여러 스키마를 순서대로 등록. 첫 실패에서 멈춘다
    pub async fn register_all(
        &self,
        schemas: impl IntoIterator<Item = SchemaHandle>,
    ) -> Result<()> {
        for handle in schemas {
            (handle.register)(&self.registry).await?;
        }
        Ok(())
    }

    pub async fn unregister<T: NexusConfig>(&self) -> bool {
        self.registry.unregister::<T>().await
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 현재 값 (논블로킹)
    pub fn get_config<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.registry.get::<T>()
    }

    /// 현재 값 + revision
    pub fn get_snapshot<T: NexusConfig>(&self) -> Result<Arc<Snapshot<T>>> {
        self.registry.snapshot::<T>()
    }

    /// 소스에서 다시 읽어 교체
    pub async fn reload_config<T: NexusConfig>(&self) -> Result<Arc<T>> {
        self.registry.reload::<T>().await
    }

    /// 민감 필드를 가린 현재 값
    pub fn config_summary<T: NexusConfig + Serialize>(&self) -> Result<Value> {
        let value = self.get_config::<T>()?;
        Ok(redact_sensitive(serde_json::to_value(value.as_ref())?))
    }

    /// 요약 등록된 모든 설정의 현재 값 (스키마 이름 → 민감 필드를 가린 JSON)
    pub fn all_config_summaries(&self) -> Result<BTreeMap<String, Value>> {
        self.registry.summaries()
    }

    pub fn is_registered<T: NexusConfig>(&self) -> bool {
        self.registry.is_registered::<T>()
    }

    pub fn entries(&self) -> Vec<EntryStatus> {
        self.registry.entries()
    }

    pub fn get_manager_info(&self) -> ManagerInfo {
        let entries = self.registry.entries();
        ManagerInfo {
            source: self.registry.source_info(),
            registered_count: entries.len(),
            config_names: entries
                .iter()
                .map(|e| e.descriptor.name().to_string())
                .collect(),
            revisions: self.registry.revisions(),
            closed: self.registry.is_closed(),
        }
    }

    /// 레지스트리 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.registry.subscribe()
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    // ========================================================================
    // 종료
    // ========================================================================

    /// 구독 해제 + 소스 종료. 여러 번 불러도 된다
    pub fn close(&self) {
        if !self.registry.is_closed() {
            info!("Closing config manager");
        }
        self.registry.close();
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_foundation::{Error, HIDDEN_VALUE};
    use nexus_provider::MemorySource;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Serialize)]
    struct DbConfig {
        host: String,
        password: String,
    }

    nexus_foundation::nexus_config!(DbConfig, data_id = "db.json", group = "PROD");

    #[derive(Debug, Deserialize, Serialize)]
    struct CacheConfig {
        #[serde(default = "default_ttl")]
        ttl: u64,
    }

    fn default_ttl() -> u64 {
        60
    }

    nexus_foundation::nexus_config!(CacheConfig, data_id = "cache.yaml");

    fn source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with_document(
                    SourceKey::new("db.json", "PROD"),
                    r#"{"host": "db1", "password": "hunter2"}"#,
                )
                .with_document(SourceKey::in_default_group("cache.yaml"), "ttl: 30\n"),
        )
    }

    #[tokio::test]
    async fn test_register_all_and_info() {
        let manager = ConfigManager::connect(source()).await.unwrap();
        manager
            .register_all([schema::<DbConfig>(), schema::<CacheConfig>()])
            .await
            .unwrap();

        assert_eq!(manager.get_config::<CacheConfig>().unwrap().ttl, 30);

        let info = manager.get_manager_info();
        assert_eq!(info.registered_count, 2);
        assert_eq!(info.config_names, vec!["CacheConfig", "DbConfig"]);
        assert_eq!(info.revisions.get("DbConfig"), Some(&1));
        assert_eq!(info.source.name, "Memory");
        assert!(info.source.connected);
        assert_eq!(info.source.watchers, 2);
        assert!(!info.closed);
    }

    #[tokio::test]
    async fn test_config_summary_hides_secrets() {
        let manager = ConfigManager::connect(source()).await.unwrap();
        manager.register::<DbConfig>().await.unwrap();

        let summary = manager.config_summary::<DbConfig>().unwrap();
        assert_eq!(summary["host"], "db1");
        assert_eq!(summary["password"], HIDDEN_VALUE);

        // 원본 값은 그대로
        assert_eq!(manager.get_config::<DbConfig>().unwrap().password, "hunter2");
    }

    #[tokio::test]
    async fn test_all_config_summaries() {
        let manager = ConfigManager::connect(source()).await.unwrap();
        manager
            .register_all([summarized_schema::<DbConfig>(), schema::<CacheConfig>()])
            .await
            .unwrap();

        let summaries = manager.all_config_summaries().unwrap();
        assert_eq!(summaries.keys().collect::<Vec<_>>(), vec!["DbConfig"]);
        assert_eq!(summaries["DbConfig"]["host"], "db1");
        assert_eq!(summaries["DbConfig"]["password"], HIDDEN_VALUE);

        manager.register_summarized::<CacheConfig>().await.unwrap();
        // 이미 등록된 스키마는 no-op이므로 요약 대상도 그대로
        assert_eq!(manager.all_config_summaries().unwrap().len(), 1);

        manager.close();
        assert!(manager.all_config_summaries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scoped_closes_on_error() {
        let source = source();
        let result: Result<()> = ConfigManager::scoped(source.clone(), |manager| async move {
            manager.register::<DbConfig>().await?;
            Err(Error::Config("boom".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert!(!source.info().connected);
        assert_eq!(source.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_closes_source() {
        let source = source();
        {
            let manager = ConfigManager::connect(source.clone()).await.unwrap();
            manager.register::<CacheConfig>().await.unwrap();
            assert_eq!(source.watcher_count(), 1);
        }
        assert_eq!(source.watcher_count(), 0);
        assert!(!source.info().connected);
    }

    #[tokio::test]
    async fn test_register_all_stops_at_failure() {
        let source = Arc::new(MemorySource::new().with_document(
            SourceKey::in_default_group("cache.yaml"),
            "ttl: 5\n",
        ));
        let manager = ConfigManager::connect(source).await.unwrap();

        let err = manager
            .register_all([schema::<CacheConfig>(), schema::<DbConfig>()])
            .await
            .unwrap_err();

        assert!(matches!(err.root_cause(), Error::NotFound(_)));
        assert!(manager.is_registered::<CacheConfig>());
        assert!(!manager.is_registered::<DbConfig>());
    }
}
