//! # Config Store
//!
//! 스키마별 캐시와 그 갱신 경로.
//!
//! - [`CacheEntry`] - 최신 유효 인스턴스 + revision, 락 없는 읽기
//! - [`UpdateCoordinator`] - 엔트리별 single-flight `fetch → decode → install`
//!
//! 읽기는 항상 마지막으로 설치된 스냅샷을 본다. 실패한 사이클은 아무것도 바꾸지 않는다.

mod coordinator;
mod entry;

pub use coordinator::UpdateCoordinator;
pub use entry::{CacheEntry, Snapshot};
