//! File config source
//!
//! 로컬 파일에서 설정을 읽고 수정 시각(mtime) 폴링으로 변경을 감지한다.
//!
//! ## 경로 규칙
//!
//! `{base_path}/{group}/{data_id}` - data_id에 확장자가 없으면
//! `default_format`의 확장자를 붙인다.
//!
//! ```text
//! configs/
//! ├── DEFAULT_GROUP/
//! │   └── app.json
//! └── PROD/
//!     └── database.yaml
//! ```

use crate::config::expand_home;
use crate::watchers::WatcherSet;
use async_trait::async_trait;
use nexus_foundation::{
    ChangeCallback, ConfigSource, Error, PayloadFormat, Result, SourceInfo, SourceKey,
    SubscriptionId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "File";

// ============================================================================
// FileSourceConfig
// ============================================================================

/// 파일 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSourceConfig {
    /// 설정 파일 기본 디렉터리 (`~/` 확장 지원)
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// 확장자 없는 data_id에 붙일 포맷
    #[serde(default)]
    pub default_format: PayloadFormat,

    /// 변경 감지 주기 (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 기본 디렉터리가 없으면 생성
    #[serde(default = "default_true")]
    pub auto_create_dirs: bool,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            default_format: PayloadFormat::default(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_create_dirs: true,
        }
    }
}

impl FileSourceConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn with_default_format(mut self, format: PayloadFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_auto_create_dirs(mut self, enabled: bool) -> Self {
        self.auto_create_dirs = enabled;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// 키에 해당하는 파일 경로
    pub fn path_for(&self, key: &SourceKey) -> Result<PathBuf> {
        for part in [&key.group, &key.data_id] {
            let path = Path::new(part);
            let escapes = part.is_empty()
                || path
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)));
            if escapes {
                return Err(Error::Config(format!("Invalid file config key: {}", key)));
            }
        }

        let file_name = if key.extension().is_some() {
            key.data_id.clone()
        } else {
            format!("{}.{}", key.data_id, self.default_format.extension())
        };

        Ok(self.base_path.join(&key.group).join(file_name))
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("configs")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

// ============================================================================
// FileSource
// ============================================================================

struct FileInner {
    config: FileSourceConfig,
    watchers: WatcherSet,
    /// 마지막으로 관찰한 수정 시각
    mtimes: Mutex<HashMap<PathBuf, SystemTime>>,
    connected: AtomicBool,
}

/// 파일 기반 설정 소스
pub struct FileSource {
    inner: Arc<FileInner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl FileSource {
    pub fn new(mut config: FileSourceConfig) -> Self {
        config.base_path = expand_home(&config.base_path);
        Self {
            inner: Arc::new(FileInner {
                config,
                watchers: WatcherSet::new(),
                mtimes: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
            }),
            poll_task: Mutex::new(None),
        }
    }

    /// 기본 디렉터리만 지정해서 생성
    pub fn at(base_path: impl Into<PathBuf>) -> Self {
        Self::new(FileSourceConfig::new(base_path))
    }

    pub fn config(&self) -> &FileSourceConfig {
        &self.inner.config
    }

    pub fn base_path(&self) -> &Path {
        &self.inner.config.base_path
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// 예제 설정 파일 작성 (확장자에 맞는 포맷으로 직렬화)
    pub fn create_sample_config(&self, key: &SourceKey, data: &Value) -> Result<PathBuf> {
        let path = self.inner.config.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(PayloadFormat::from_extension)
            .unwrap_or(PayloadFormat::Json);

        let content = match format {
            PayloadFormat::Json => serde_json::to_string_pretty(data)?,
            PayloadFormat::Yaml => serde_yaml::to_string(data)
                .map_err(|e| Error::Config(format!("YAML: {}", e)))?,
            PayloadFormat::Toml => toml::to_string_pretty(data)
                .map_err(|e| Error::Config(format!("TOML: {}", e)))?,
        };

        std::fs::write(&path, content)?;
        info!("Created sample config: {}", path.display());
        Ok(path)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::unavailable(SOURCE_NAME, "not connected to file system"))
        }
    }

    fn start_polling(&self) {
        let mut guard = self.poll_task.lock();
        if guard.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let interval = inner.config.poll_interval();

        *guard = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                inner.check_changes().await;
            }
        }));

        debug!("File watch loop started ({:?})", interval);
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
            debug!("File watch loop stopped");
        }
    }
}

impl FileInner {
    /// 구독 중인 파일들의 mtime을 확인하고 변경 시 알림
    async fn check_changes(&self) {
        for key in self.watchers.keys() {
            let path = match self.config.path_for(&key) {
                Ok(path) => path,
                Err(_) => continue,
            };

            let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if self.mtimes.lock().remove(&path).is_some() {
                        warn!("Config file removed: {}", path.display());
                    }
                    continue;
                }
                Err(e) => {
                    error!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let changed = {
                let mut mtimes = self.mtimes.lock();
                match mtimes.get(&path) {
                    Some(prev) if *prev == modified => false,
                    _ => {
                        mtimes.insert(path.clone(), modified);
                        true
                    }
                }
            };

            if !changed {
                continue;
            }

            info!("Detected file change: {}", path.display());

            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let content = content.trim();
                    if content.is_empty() {
                        warn!("Config file became empty, skipping: {}", path.display());
                    } else {
                        self.watchers.notify(&key, content);
                    }
                }
                Err(e) => error!("Failed to read changed file {}: {}", path.display(), e),
            }
        }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn connect(&self) -> Result<()> {
        let base = &self.inner.config.base_path;

        if self.inner.config.auto_create_dirs && !base.exists() {
            tokio::fs::create_dir_all(base).await.map_err(|e| {
                Error::unavailable(SOURCE_NAME, format!("cannot create {}: {}", base.display(), e))
            })?;
            info!("Created config directory: {}", base.display());
        }

        if !base.exists() {
            return Err(Error::unavailable(
                SOURCE_NAME,
                format!("config directory does not exist: {}", base.display()),
            ));
        }
        if !base.is_dir() {
            return Err(Error::unavailable(
                SOURCE_NAME,
                format!("config path is not a directory: {}", base.display()),
            ));
        }

        self.start_polling();
        self.inner.connected.store(true, Ordering::SeqCst);
        info!("Connected to file system: {}", base.display());
        Ok(())
    }

    async fn fetch(&self, key: &SourceKey) -> Result<String> {
        self.ensure_connected()?;
        let path = self.inner.config.path_for(key)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::NotFound(key.clone())),
            Err(e) => {
                error!("Failed to read config file {}: {}", path.display(), e);
                return Err(Error::unavailable(
                    SOURCE_NAME,
                    format!("cannot read {}: {}", path.display(), e),
                ));
            }
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(Error::unavailable(
                SOURCE_NAME,
                format!("config file is empty: {}", path.display()),
            ));
        }

        debug!("Read config file: {}", path.display());
        Ok(content.to_string())
    }

    fn subscribe(&self, key: &SourceKey, on_change: ChangeCallback) -> Result<SubscriptionId> {
        self.ensure_connected()?;
        let path = self.inner.config.path_for(key)?;

        // 구독 시점의 mtime을 기준으로 이후 변경만 알린다
        if let Ok(modified) = std::fs::metadata(&path).and_then(|m| m.modified()) {
            self.inner.mtimes.lock().entry(path.clone()).or_insert(modified);
        }

        let id = self.inner.watchers.add(key, on_change);
        info!("Watching config file: {}", path.display());
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(key) = self.inner.watchers.remove(id) {
            if !self.inner.watchers.is_watched(&key) {
                if let Ok(path) = self.inner.config.path_for(&key) {
                    self.inner.mtimes.lock().remove(&path);
                    info!("Stopped watching config file: {}", path.display());
                }
            }
        }
    }

    fn close(&self) {
        self.stop_polling();
        self.inner.watchers.clear();
        self.inner.mtimes.lock().clear();
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnected from file system");
        }
    }

    fn info(&self) -> SourceInfo {
        SourceInfo::new(SOURCE_NAME, self.is_connected(), self.inner.watchers.len())
            .with_detail("basePath", self.inner.config.base_path.display().to_string())
            .with_detail("pollIntervalMs", self.inner.config.poll_interval_ms.to_string())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
