//! nexus-core: Config registry and store for Nexus
//!
//! Layer2 - 스키마 등록, 캐시, 변경 반영
//!
//! # 주요 모듈
//!
//! - `store`: 스키마별 캐시 엔트리와 single-flight 갱신 코디네이터
//! - `registry`: 스키마 타입 → 엔트리 테이블, 등록/해제/종료
//! - `manager`: 애플리케이션용 파사드 (`ConfigManager`)
//! - `events`: 등록/갱신/실패 이벤트
//!
//! # 사용 예시
//!
//! ```ignore
//! use nexus_core::ConfigManager;
//! use nexus_foundation::nexus_config;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct DatabaseConfig {
//!     host: String,
//!     #[serde(default = "default_port")]
//!     port: u16,
//! }
//!
//! nexus_config!(DatabaseConfig, data_id = "database.json");
//!
//! let manager = ConfigManager::connect(source).await?;
//! manager.register::<DatabaseConfig>().await?;
//!
//! // 락 없이 최신 값을 읽는다. 소스가 바뀌면 백그라운드에서 교체된다
//! let db = manager.get_config::<DatabaseConfig>()?;
//!
//! // 이벤트 구독
//! let mut events = manager.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod events;
pub mod manager;
pub mod registry;
pub mod store;

// Re-exports: Manager
pub use manager::{
    schema, summarized_schema, ConfigManager, ManagerBuilder, ManagerInfo, SchemaHandle,
};

// Re-exports: Registry / Store
pub use events::ConfigEvent;
pub use registry::{ConfigRegistry, EntryStatus};
pub use store::{CacheEntry, Snapshot, UpdateCoordinator};

// Re-exports: Foundation
pub use nexus_foundation::{nexus_config, Error, NexusConfig, Result, SourceKey};
