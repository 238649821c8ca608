//! ConfigManager builder

use super::ConfigManager;
use crate::registry::ConfigRegistry;
use nexus_foundation::{ConfigSource, Decoder, Error, FormatDecoder, PayloadFormat, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info};

/// 이벤트 채널 기본 용량
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// 매니저 빌더
pub struct ManagerBuilder {
    source: Arc<dyn ConfigSource>,
    decoder: Option<Arc<dyn Decoder>>,
    format_decoder: FormatDecoder,
    event_capacity: usize,
    runtime: Option<Handle>,
}

impl ManagerBuilder {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            decoder: None,
            format_decoder: FormatDecoder::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            runtime: None,
        }
    }

    /// 커스텀 디코더 (포맷 옵션은 무시됨)
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// 확장자가 없는 data_id의 포맷
    pub fn with_default_format(mut self, format: PayloadFormat) -> Self {
        self.format_decoder = self.format_decoder.with_fallback(format);
        self
    }

    /// 문자열 값의 환경 변수 치환
    pub fn with_env_expansion(mut self, enabled: bool) -> Self {
        self.format_decoder = self.format_decoder.with_env_expansion(enabled);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// 갱신 사이클을 띄울 런타임 (기본: 현재 런타임)
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 소스에 연결하고 매니저 생성
    pub async fn build(self) -> Result<ConfigManager> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| Error::Config(format!("No tokio runtime available: {}", e)))?,
        };

        if let Err(e) = self.source.connect().await {
            error!("Failed to connect {} source: {}", self.source.name(), e);
            self.source.close();
            return Err(e);
        }

        let decoder: Arc<dyn Decoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(self.format_decoder),
        };

        info!("Config manager connected to {} source", self.source.name());
        Ok(ConfigManager::from_registry(ConfigRegistry::new(
            self.source,
            decoder,
            runtime,
            self.event_capacity,
        )))
    }
}
