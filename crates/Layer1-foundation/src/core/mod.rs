//! Core Module - 설정 소스 계약 및 타입
//!
//! - `types.rs`: 데이터 타입 (SourceKey, ChangeNotification, SourceInfo 등)
//! - `traits.rs`: 인터페이스 (ConfigSource)

pub mod traits;
pub mod types;

pub use traits::{ChangeCallback, ConfigSource};
pub use types::{ChangeNotification, SourceInfo, SourceKey, SubscriptionId, DEFAULT_GROUP};
