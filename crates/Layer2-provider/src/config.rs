//! Source configuration loading
//!
//! 어떤 소스를 쓸지 파일(JSON/TOML)로 선언하고 `build()`로 생성한다.
//!
//! ```json
//! {
//!   // JSON 파일은 주석 허용
//!   "type": "nacos",
//!   "serverAddresses": ["127.0.0.1:8848"],
//!   "namespace": "dev"
//! }
//! ```
//!
//! 자격 증명은 환경 변수 `NACOS_USERNAME` / `NACOS_PASSWORD`가 있으면 덮어쓴다.

use crate::file::{FileSource, FileSourceConfig};
use crate::memory::MemorySource;
use crate::nacos::{NacosSource, NacosSourceConfig};
use nexus_foundation::{ConfigSource, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const ENV_NACOS_USERNAME: &str = "NACOS_USERNAME";
pub const ENV_NACOS_PASSWORD: &str = "NACOS_PASSWORD";

/// 소스 종류별 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    File(FileSourceConfig),
    Nacos(NacosSourceConfig),
    Memory,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::File(FileSourceConfig::default())
    }
}

impl SourceConfig {
    /// 파일에서 로드 (`.toml`이면 TOML, 그 외 주석 허용 JSON)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let mut config: SourceConfig = if is_toml {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?
        } else {
            serde_json::from_str(&strip_json_comments(&content))
                .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?
        };

        config.apply_env_overrides();
        debug!("Loaded source config from {}", path.display());
        Ok(config)
    }

    /// 환경 변수 덮어쓰기
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let SourceConfig::Nacos(nacos) = self {
            if let Some(username) = lookup(ENV_NACOS_USERNAME) {
                nacos.username = Some(username);
            }
            if let Some(password) = lookup(ENV_NACOS_PASSWORD) {
                nacos.password = Some(password);
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::File(_) => "file",
            SourceConfig::Nacos(_) => "nacos",
            SourceConfig::Memory => "memory",
        }
    }

    /// 설정대로 소스 생성 (연결은 하지 않음)
    pub fn build(&self) -> Result<Arc<dyn ConfigSource>> {
        info!("Building {} config source", self.kind());
        Ok(match self {
            SourceConfig::File(config) => Arc::new(FileSource::new(config.clone())),
            SourceConfig::Nacos(config) => Arc::new(NacosSource::new(config.clone())?),
            SourceConfig::Memory => Arc::new(MemorySource::new()),
        })
    }
}

/// `~/`로 시작하는 경로를 홈 디렉터리 기준으로
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// JSON 문자열 밖의 `//`, `/* */` 주석 제거
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                // 줄 끝까지 스킵, 개행은 유지
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => output.push(c),
        }
    }

    output
}
