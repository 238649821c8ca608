//! Nacos config source
//!
//! Nacos Open API(HTTP)로 설정을 읽는다.
//!
//! - `GET /nacos/v1/cs/configs?dataId=&group=&tenant=` 로 조회
//! - username/password가 있으면 `POST /nacos/v1/auth/login`으로 토큰 발급
//! - 여러 서버 주소가 있으면 실패 시 다음 서버로 넘어간다
//! - 변경 감지는 구독 중인 키의 내용을 주기적으로 비교

use crate::retry::{with_retry, RetryConfig};
use crate::watchers::WatcherSet;
use async_trait::async_trait;
use nexus_foundation::{
    ChangeCallback, ConfigSource, Error, Result, SourceInfo, SourceKey, SubscriptionId,
    DEFAULT_GROUP,
};
use parking_lot::{Mutex, RwLock};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "Nacos";
const CONFIGS_PATH: &str = "/nacos/v1/cs/configs";
const LOGIN_PATH: &str = "/nacos/v1/auth/login";

/// 연결 확인용으로 조회하는 data_id (존재하지 않아도 됨)
const CONNECTION_TEST_ID: &str = "__connection_test__";

/// 서버가 TTL을 주지 않을 때 (Nacos 기본값)
const DEFAULT_TOKEN_TTL_SECS: u64 = 18_000;

// ============================================================================
// NacosSourceConfig
// ============================================================================

/// Nacos 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NacosSourceConfig {
    /// 서버 주소 목록 (`host:port` 또는 `http://host:port`)
    pub server_addresses: Vec<String>,

    /// 네임스페이스 ID (빈 문자열 = public)
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// 변경 감지 주기 (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// HTTP 요청 타임아웃 (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl NacosSourceConfig {
    /// 쉼표로 구분된 주소 문자열도 허용
    pub fn new(server_addresses: impl AsRef<str>) -> Self {
        Self {
            server_addresses: server_addresses
                .as_ref()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            namespace: String::new(),
            username: None,
            password: None,
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// 스킴이 붙은 서버 URL 목록
    pub fn server_urls(&self) -> Vec<String> {
        self.server_addresses
            .iter()
            .map(|addr| {
                let addr = addr.trim_end_matches('/');
                if addr.starts_with("http://") || addr.starts_with("https://") {
                    addr.to_string()
                } else {
                    format!("http://{}", addr)
                }
            })
            .collect()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    token_ttl: Option<u64>,
}

/// 발급받은 토큰과 갱신 시점
struct AccessToken {
    value: String,
    /// TTL의 90% 지점. 이후 요청 전에 다시 로그인한다
    refresh_at: Instant,
}

impl AccessToken {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            refresh_at: Instant::now() + ttl.mul_f64(0.9),
        }
    }

    fn is_stale(&self) -> bool {
        Instant::now() >= self.refresh_at
    }
}

/// 설정 조회 응답 분류
enum ConfigReply {
    Found(String),
    Missing,
    /// 401/403 - 토큰 만료 또는 권한 없음
    Denied(StatusCode, String),
}

// ============================================================================
// NacosSource
// ============================================================================

struct NacosInner {
    config: NacosSourceConfig,
    servers: Vec<String>,
    client: Client,
    access_token: RwLock<Option<AccessToken>>,
    /// 마지막으로 성공한 서버 인덱스
    active_server: AtomicUsize,
    watchers: WatcherSet,
    /// 구독 키별 마지막으로 본 내용. None = 아직 기준값 없음
    observed: Mutex<HashMap<SourceKey, Option<String>>>,
    connected: AtomicBool,
}

/// Nacos 설정 소스
pub struct NacosSource {
    inner: Arc<NacosInner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl NacosSource {
    pub fn new(config: NacosSourceConfig) -> Result<Self> {
        let servers = config.server_urls();
        if servers.is_empty() {
            return Err(Error::Config("Nacos server address is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(NacosInner {
                config,
                servers,
                client,
                access_token: RwLock::new(None),
                active_server: AtomicUsize::new(0),
                watchers: WatcherSet::new(),
                observed: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
            }),
            poll_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &NacosSourceConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::unavailable(SOURCE_NAME, "not connected to Nacos server"))
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

        debug!("Nacos watch loop started ({:?})", interval);
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
            debug!("Nacos watch loop stopped");
        }
    }
}

impl NacosInner {
    /// 토큰 발급 (자격 증명이 없으면 아무것도 하지 않음)
    async fn login(&self) -> Result<()> {
        let Some((username, password)) = self.config.credentials() else {
            return Ok(());
        };

        let mut last_error = None;
        for server in self.ordered_servers() {
            let url = format!("{}{}", server, LOGIN_PATH);
            let response = match self
                .client
                .post(&url)
                .form(&[("username", username), ("password", password)])
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Nacos login request to {} failed: {}", server, e);
                    last_error = Some(Error::unavailable(SOURCE_NAME, e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::unavailable(
                    SOURCE_NAME,
                    format!("login rejected ({}): {}", status, body),
                ));
            }

            let login: LoginResponse = response.json().await.map_err(|e| {
                Error::unavailable(SOURCE_NAME, format!("invalid login response: {}", e))
            })?;

            let ttl = Duration::from_secs(login.token_ttl.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
            debug!("Nacos login succeeded (ttl: {:?})", ttl);
            *self.access_token.write() = Some(AccessToken::new(login.access_token, ttl));
            return Ok(());
        }

        Err(last_error.unwrap_or_else(|| Error::unavailable(SOURCE_NAME, "no server reachable")))
    }

    /// 활성 서버부터 시작하는 순서
    fn ordered_servers(&self) -> Vec<&str> {
        let start = self.active_server.load(Ordering::Relaxed) % self.servers.len();
        self.servers[start..]
            .iter()
            .chain(self.servers[..start].iter())
            .map(|s| s.as_str())
            .collect()
    }

    /// 토큰이 없거나 갱신 시점이 지났으면 다시 로그인
    async fn ensure_token(&self) -> Result<()> {
        if self.config.credentials().is_none() {
            return Ok(());
        }

        let fresh = self
            .access_token
            .read()
            .as_ref()
            .is_some_and(|token| !token.is_stale());
        if fresh {
            return Ok(());
        }

        debug!("Nacos access token missing or expiring, logging in");
        self.login().await
    }

    /// 설정 조회. 없는 설정이면 `Ok(None)`
    ///
    /// 401/403이면 토큰을 버리고 한 번 다시 로그인한 뒤 재요청한다.
    async fn request_config(&self, key: &SourceKey) -> Result<Option<String>> {
        self.ensure_token().await?;

        let (status, body) = match self.query_config(key).await? {
            ConfigReply::Found(body) => return Ok(Some(body)),
            ConfigReply::Missing => return Ok(None),
            ConfigReply::Denied(status, body) => (status, body),
        };

        if self.config.credentials().is_none() {
            return Err(denied(key, status, &body));
        }

        warn!("Nacos rejected access token for {} ({}), logging in again", key, status);
        *self.access_token.write() = None;
        self.login().await?;

        match self.query_config(key).await? {
            ConfigReply::Found(body) => Ok(Some(body)),
            ConfigReply::Missing => Ok(None),
            ConfigReply::Denied(status, body) => Err(denied(key, status, &body)),
        }
    }

    /// 서버 failover를 포함한 단일 조회
    async fn query_config(&self, key: &SourceKey) -> Result<ConfigReply> {
        let token = self
            .access_token
            .read()
            .as_ref()
            .map(|token| token.value.clone());
        let mut last_error = None;

        for (offset, server) in self.ordered_servers().into_iter().enumerate() {
            let url = format!("{}{}", server, CONFIGS_PATH);
            let mut query = vec![
                ("dataId", key.data_id.as_str()),
                ("group", key.group.as_str()),
                ("tenant", self.config.namespace.as_str()),
            ];
            if let Some(ref token) = token {
                query.push(("accessToken", token.as_str()));
            }

            let response = match self.client.get(&url).query(&query).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Nacos request to {} failed: {}", server, e);
                    last_error = Some(Error::unavailable(SOURCE_NAME, e.to_string()));
                    continue;
                }
            };

            if offset > 0 {
                let index = self.servers.iter().position(|s| s == server).unwrap_or(0);
                self.active_server.store(index, Ordering::Relaxed);
                info!("Switched to Nacos server {}", server);
            }

            return match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.map_err(|e| {
                        Error::unavailable(SOURCE_NAME, format!("failed to read body: {}", e))
                    })?;
                    Ok(ConfigReply::Found(body))
                }
                StatusCode::NOT_FOUND => Ok(ConfigReply::Missing),
                status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    let body = response.text().await.unwrap_or_default();
                    Ok(ConfigReply::Denied(status, body))
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    Err(denied(key, status, &body))
                }
            };
        }

        Err(last_error.unwrap_or_else(|| Error::unavailable(SOURCE_NAME, "no server reachable")))
    }

    /// 구독 키의 기준값이 비어 있으면 채운다
    fn record_baseline(&self, key: &SourceKey, content: &str) {
        if let Some(slot) = self.observed.lock().get_mut(key) {
            if slot.is_none() {
                *slot = Some(content.to_string());
            }
        }
    }

    async fn check_changes(&self) {
        let keys: Vec<SourceKey> = self.observed.lock().keys().cloned().collect();

        for key in keys {
            let content = match self.request_config(&key).await {
                Ok(Some(content)) if !content.trim().is_empty() => content,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Nacos poll for {} failed: {}", key, e);
                    continue;
                }
            };

            let changed = {
                let mut observed = self.observed.lock();
                match observed.get_mut(&key) {
                    // 폴링 도중 구독 해제됨
                    None => false,
                    // 기준값이 없으면 기록만 하고 알리지 않는다
                    Some(slot) => {
                        let changed = slot.as_deref().is_some_and(|prev| prev != content);
                        if slot.as_deref() != Some(content.as_str()) {
                            *slot = Some(content.clone());
                        }
                        changed
                    }
                }
            };

            if changed {
                info!("Detected config change: {}", key);
                self.watchers.notify(&key, &content);
            }
        }
    }
}

fn denied(key: &SourceKey, status: StatusCode, body: &str) -> Error {
    Error::unavailable(
        SOURCE_NAME,
        format!("{} returned {}: {}", key, status, body.trim()),
    )
}

#[async_trait]
impl ConfigSource for NacosSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn connect(&self) -> Result<()> {
        let inner: &NacosInner = &self.inner;

        with_retry(&inner.config.retry, "nacos login", || inner.login()).await?;

        // 존재하지 않는 키를 조회해서 서버 응답 여부만 확인
        let test_key = SourceKey::new(CONNECTION_TEST_ID, DEFAULT_GROUP);
        if let Err(e) = inner.request_config(&test_key).await {
            inner.connected.store(false, Ordering::SeqCst);
            error!("Failed to connect to Nacos {:?}: {}", inner.servers, e);
            return Err(e);
        }

        self.start_polling();
        inner.connected.store(true, Ordering::SeqCst);
        info!("Connected to Nacos server: {:?}", inner.servers);
        Ok(())
    }

    async fn fetch(&self, key: &SourceKey) -> Result<String> {
        self.ensure_connected()?;
        let inner: &NacosInner = &self.inner;

        let content = with_retry(&inner.config.retry, "nacos fetch", || {
            inner.request_config(key)
        })
        .await?;

        match content {
            Some(content) if !content.trim().is_empty() => {
                inner.record_baseline(key, &content);
                debug!("Fetched config: {}", key);
                Ok(content)
            }
            _ => Err(Error::NotFound(key.clone())),
        }
    }

    fn subscribe(&self, key: &SourceKey, on_change: ChangeCallback) -> Result<SubscriptionId> {
        self.ensure_connected()?;
        self.inner.observed.lock().entry(key.clone()).or_insert(None);
        let id = self.inner.watchers.add(key, on_change);
        info!("Watching Nacos config: {}", key);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(key) = self.inner.watchers.remove(id) {
            if !self.inner.watchers.is_watched(&key) {
                self.inner.observed.lock().remove(&key);
                info!("Stopped watching Nacos config: {}", key);
            }
        }
    }

    fn close(&self) {
        self.stop_polling();
        self.inner.watchers.clear();
        self.inner.observed.lock().clear();
        *self.inner.access_token.write() = None;
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnected from Nacos");
        }
    }

    fn info(&self) -> SourceInfo {
        let config = &self.inner.config;
        let mut info = SourceInfo::new(SOURCE_NAME, self.is_connected(), self.inner.watchers.len())
            .with_detail("serverAddresses", config.server_addresses.join(","))
            .with_detail("namespace", config.namespace.clone());
        if let Some(ref username) = config.username {
            info = info.with_detail("username", username.clone());
        }
        info
    }
}

impl Drop for NacosSource {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// 최소한의 Nacos 응답 서버 상태
    #[derive(Default)]
    struct StubState {
        /// dataId → 내용. 없으면 404
        documents: HashMap<String, String>,
        /// Some이면 accessToken이 필요하다
        auth: Option<StubAuth>,
    }

    struct StubAuth {
        logins: u32,
        /// 현재 받아주는 토큰. None이면 모든 토큰 거부
        valid_token: Option<String>,
        token_ttl_secs: u64,
    }

    impl StubState {
        fn with_auth(token_ttl_secs: u64) -> Self {
            Self {
                documents: HashMap::new(),
                auth: Some(StubAuth {
                    logins: 0,
                    valid_token: None,
                    token_ttl_secs,
                }),
            }
        }

        fn logins(&self) -> u32 {
            self.auth.as_ref().map_or(0, |a| a.logins)
        }

        /// 서버 쪽 토큰 만료
        fn expire_token(&mut self) {
            if let Some(auth) = self.auth.as_mut() {
                auth.valid_token = None;
            }
        }

        fn respond(&mut self, request: &str) -> (&'static str, String) {
            let target = request.split_whitespace().nth(1).unwrap_or("");
            let param = |name: &str| {
                let prefix = format!("{}=", name);
                target
                    .split(['?', '&'])
                    .find_map(|p| p.strip_prefix(prefix.as_str()))
                    .unwrap_or("")
                    .to_string()
            };

            if target.starts_with(LOGIN_PATH) {
                return match self.auth.as_mut() {
                    Some(auth) => {
                        auth.logins += 1;
                        let token = format!("t{}", auth.logins);
                        auth.valid_token = Some(token.clone());
                        (
                            "200 OK",
                            format!(
                                r#"{{"accessToken":"{}","tokenTtl":{}}}"#,
                                token, auth.token_ttl_secs
                            ),
                        )
                    }
                    None => ("404 Not Found", String::new()),
                };
            }

            if let Some(ref auth) = self.auth {
                if auth.valid_token.as_deref() != Some(param("accessToken").as_str()) {
                    return ("403 Forbidden", "token expired".to_string());
                }
            }

            match self.documents.get(&param("dataId")) {
                Some(body) => ("200 OK", body.clone()),
                None => ("404 Not Found", "config data not exist".to_string()),
            }
        }
    }

    type Shared = Arc<Mutex<StubState>>;

    async fn stub_server(state: Shared) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let state = state.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();

                    let (status, body) = state.lock().respond(&request);

                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        addr.to_string()
    }

    fn shared_with(documents: &[(&str, &str)]) -> Shared {
        let mut state = StubState::default();
        for (id, body) in documents {
            state.documents.insert(id.to_string(), body.to_string());
        }
        Arc::new(Mutex::new(state))
    }

    fn fast_config(addr: &str) -> NacosSourceConfig {
        NacosSourceConfig::new(addr)
            .with_poll_interval(Duration::from_millis(20))
            .with_timeout(Duration::from_millis(500))
            .with_retry(RetryConfig::no_retry())
    }

    #[test]
    fn test_config_parsing() {
        let config = NacosSourceConfig::new("10.0.0.1:8848, https://nacos.internal/");
        assert_eq!(
            config.server_urls(),
            vec!["http://10.0.0.1:8848", "https://nacos.internal"]
        );
        assert!(NacosSource::new(NacosSourceConfig::new("")).is_err());
    }

    #[test]
    fn test_password_not_serialized() {
        let config = NacosSourceConfig::new("localhost:8848").with_credentials("nacos", "pw");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("nacos"));
        assert!(!json.contains("\"pw\""));
    }

    #[test]
    fn test_token_refresh_point() {
        let token = AccessToken::new("t".into(), Duration::from_secs(100));
        assert!(!token.is_stale());

        let token = AccessToken::new("t".into(), Duration::ZERO);
        assert!(token.is_stale());
    }

    #[tokio::test]
    async fn test_connect_and_fetch() {
        let addr = stub_server(shared_with(&[("db.json", r#"{"host":"db1"}"#)])).await;

        let source = NacosSource::new(fast_config(&addr)).unwrap();
        source.connect().await.unwrap();
        assert!(source.info().connected);

        let key = SourceKey::in_default_group("db.json");
        assert_eq!(source.fetch(&key).await.unwrap(), r#"{"host":"db1"}"#);

        let missing = SourceKey::in_default_group("missing.json");
        assert!(matches!(source.fetch(&missing).await, Err(Error::NotFound(_))));

        source.close();
        assert!(!source.is_connected());
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        // 바인딩 후 바로 닫아서 연결이 거부되는 포트
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let source = NacosSource::new(fast_config(&addr)).unwrap();
        let err = source.connect().await.unwrap_err();
        assert!(err.is_transient());
        assert!(!source.is_connected());
    }

    #[tokio::test]
    async fn test_failover_to_second_server() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let live_addr = stub_server(shared_with(&[("app.json", "{}")])).await;

        let source =
            NacosSource::new(fast_config(&format!("{},{}", dead_addr, live_addr))).unwrap();
        source.connect().await.unwrap();

        let key = SourceKey::in_default_group("app.json");
        assert_eq!(source.fetch(&key).await.unwrap(), "{}");
        source.close();
    }

    #[tokio::test]
    async fn test_poll_detects_change() {
        let state = shared_with(&[("app.json", r#"{"v":1}"#)]);
        let addr = stub_server(state.clone()).await;

        let source = NacosSource::new(fast_config(&addr)).unwrap();
        source.connect().await.unwrap();

        let key = SourceKey::in_default_group("app.json");
        let (tx, mut rx) = mpsc::unbounded_channel();
        source
            .subscribe(&key, Arc::new(move |n| {
                let _ = tx.send(n.payload);
            }))
            .unwrap();
        source.fetch(&key).await.unwrap();

        state
            .lock()
            .documents
            .insert("app.json".into(), r#"{"v":2}"#.into());

        let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change not detected")
            .unwrap();
        assert_eq!(payload, r#"{"v":2}"#);

        source.close();
    }

    #[tokio::test]
    async fn test_relogin_after_token_rejected() {
        let mut stub = StubState::with_auth(DEFAULT_TOKEN_TTL_SECS);
        stub.documents.insert("app.json".into(), r#"{"v":1}"#.into());
        let state: Shared = Arc::new(Mutex::new(stub));
        let addr = stub_server(state.clone()).await;

        let source =
            NacosSource::new(fast_config(&addr).with_credentials("nacos", "nacos")).unwrap();
        source.connect().await.unwrap();
        assert_eq!(state.lock().logins(), 1);

        let key = SourceKey::in_default_group("app.json");
        assert_eq!(source.fetch(&key).await.unwrap(), r#"{"v":1}"#);

        // 서버가 토큰을 만료시킨다
        state.lock().expire_token();

        assert_eq!(source.fetch(&key).await.unwrap(), r#"{"v":1}"#);
        assert_eq!(state.lock().logins(), 2);

        // 새 토큰으로는 추가 로그인 없이 계속 읽힌다
        assert_eq!(source.fetch(&key).await.unwrap(), r#"{"v":1}"#);
        assert_eq!(state.lock().logins(), 2);

        source.close();
    }

    #[tokio::test]
    async fn test_token_refreshed_before_ttl() {
        let mut stub = StubState::with_auth(1);
        stub.documents.insert("app.json".into(), "{}".into());
        let state: Shared = Arc::new(Mutex::new(stub));
        let addr = stub_server(state.clone()).await;

        let source =
            NacosSource::new(fast_config(&addr).with_credentials("nacos", "nacos")).unwrap();
        source.connect().await.unwrap();

        let key = SourceKey::in_default_group("app.json");
        source.fetch(&key).await.unwrap();
        assert_eq!(state.lock().logins(), 1);

        // TTL 1초의 90% 지점을 넘긴다
        tokio::time::sleep(Duration::from_millis(1000)).await;

        source.fetch(&key).await.unwrap();
        assert_eq!(state.lock().logins(), 2);

        source.close();
    }

    #[tokio::test]
    async fn test_denied_without_credentials() {
        let state: Shared = Arc::new(Mutex::new(StubState::with_auth(DEFAULT_TOKEN_TTL_SECS)));
        let addr = stub_server(state.clone()).await;

        // 자격 증명이 없으면 재로그인 없이 실패한다
        let source = NacosSource::new(fast_config(&addr)).unwrap();
        let err = source.connect().await.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert_eq!(state.lock().logins(), 0);
    }
}
