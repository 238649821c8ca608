//! # nexus-provider
//!
//! Config source adapters for Nexus.
//! 모든 소스는 `nexus_foundation::ConfigSource`를 구현한다.
//!
//! ## Sources
//! - [`FileSource`] - 로컬 디렉터리 (`{base}/{group}/{data_id}`), mtime 폴링
//! - [`NacosSource`] - Nacos Open API, 내용 폴링, 서버 failover
//! - [`MemorySource`] - 프로세스 내부 문서 (임베딩/테스트)
//!
//! 어떤 소스를 쓸지는 [`SourceConfig`]로 파일에서 선언할 수 있다.

pub mod config;
pub mod file;
pub mod memory;
pub mod nacos;
pub mod retry;
pub mod watchers;

pub use config::{expand_home, strip_json_comments, SourceConfig};
pub use file::{FileSource, FileSourceConfig};
pub use memory::MemorySource;
pub use nacos::{NacosSource, NacosSourceConfig};
pub use retry::RetryConfig;
pub use watchers::WatcherSet;
