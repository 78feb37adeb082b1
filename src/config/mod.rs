use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::fetcher::DEFAULT_MAX_DOWNLOAD_BYTES;
use crate::utils::validator;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub download: DownloadSettings,
    pub rate_limit: RateLimitSettings,
    pub sanitizer: SanitizerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// 监听地址
    pub bind: String,
    /// 监听端口
    pub port: u16,
    /// 工作线程数
    pub workers: usize,
    /// 请求体大小上限（字节）
    pub body_limit_bytes: usize,
    /// `/api/ping` 返回的内容
    pub ping_message: String,
    /// 日志文件，不配置时输出到 stderr
    pub log_file: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            workers: 2,
            body_limit_bytes: 10 * 1024,
            ping_message: "ping".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DownloadSettings {
    /// 单次下载字节上限
    pub max_bytes: u64,
    /// 重试次数（不含首次）
    pub retry_count: u32,
    /// 首次重试前的等待（毫秒），之后每次翻倍
    pub retry_base_delay_ms: u64,
    /// 单个下载请求的总时限（秒）
    pub request_timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            retry_count: 3,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TierSettings {
    /// 窗口长度（秒）
    pub window_secs: u64,
    /// 窗口内最多请求数
    pub max_requests: u32,
    /// 超限时返回的文本
    pub message: String,
}

impl TierSettings {
    fn new(window_secs: u64, max_requests: u32, message: &str) -> Self {
        Self {
            window_secs,
            max_requests,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 过期计数桶的清理间隔（秒）
    pub sweep_interval_secs: u64,
    /// 归入认证级的路由前缀
    pub auth_prefixes: Vec<String>,
    /// 归入 API 级的路由前缀
    pub api_prefixes: Vec<String>,
    /// 不限流的路径
    pub exempt_paths: Vec<String>,
    pub global: TierSettings,
    pub auth: TierSettings,
    pub api: TierSettings,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            auth_prefixes: vec!["/api/auth".to_string()],
            api_prefixes: vec!["/api".to_string(), "/download".to_string()],
            exempt_paths: Vec::new(),
            global: TierSettings::new(
                15 * 60,
                100,
                "Too many requests from this IP, please try again later.",
            ),
            auth: TierSettings::new(
                15 * 60,
                5,
                "Too many authentication attempts, please try again later.",
            ),
            api: TierSettings::new(60, 30, "Too many API requests, please try again later."),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SanitizerSettings {
    /// 去除首尾空白后字符串字段的最大字符数
    pub max_field_chars: usize,
    /// 出现即拒绝的子串
    pub forbidden_markers: Vec<String>,
}

impl Default for SanitizerSettings {
    fn default() -> Self {
        Self {
            max_field_chars: 5000,
            forbidden_markers: vec!["__proto__".to_string(), "constructor".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Firebase,
    Local,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// firebase: 存储桶名
    pub bucket: String,
    /// firebase: REST 接口地址
    pub api_base: String,
    /// firebase: 请求超时（秒）
    pub timeout_secs: u64,
    /// local: 根目录
    pub root: String,
    /// firebase: Bearer 令牌，也可用 STORAGE_TOKEN 环境变量
    pub token: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: String::new(),
            api_base: "https://firebasestorage.googleapis.com".to_string(),
            timeout_secs: 60,
            root: "./storage".to_string(),
            token: None,
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件: {}", path))?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    // 不覆盖用户的文件，只退回默认值
                    eprintln!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带说明的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
            }
        }
        let config_content = toml::to_string_pretty(self).context("无法序列化配置")?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content).with_context(|| format!("无法保存配置文件: {}", path))?;
        Ok(())
    }

    fn generate_tutorial_content() -> String {
        r#"# storeproxy 配置文件
# ====================
#
# TOML 格式。命令行参数 > 环境变量 > 配置文件 > 默认值
#
# 环境变量：
#   PORT           覆盖 server.port
#   PING_MESSAGE   覆盖 server.ping_message
#   STORAGE_TOKEN  覆盖 storage.token
#
# [server]       监听地址、端口、请求体上限（默认 10KB）
# [download]     下载上限（默认 500MB）、重试次数与退避、单请求时限
#                重试等待依次为 base, 2*base, 4*base ...
# [rate_limit]   三级固定窗口限流：global 全部路由，auth 认证路由，api API 路由
#                同一客户端地址在窗口内超过 max_requests 次即返回 429
# [sanitizer]    JSON 请求体中的字符串字段：去首尾空白、长度上限、可疑子串
# [storage]      backend = "firebase" 或 "local"
"#
        .to_string()
    }

    /// 用环境变量覆盖
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ping) = lookup("PING_MESSAGE") {
            self.server.ping_message = ping;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(token) = lookup("STORAGE_TOKEN").filter(|t| !t.is_empty()) {
            self.storage.token = Some(token);
        }
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(bind) = &args.bind {
            self.server.bind = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(backend) = args.backend {
            self.storage.backend = backend.into();
        }
        if let Some(root) = &args.storage_root {
            self.storage.root = root.clone();
        }
        if let Some(bucket) = &args.bucket {
            self.storage.bucket = bucket.clone();
        }
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        validator::validate_port(self.server.port)?;
        if self.server.workers == 0 {
            anyhow::bail!("server.workers 必须大于0");
        }
        if self.server.body_limit_bytes == 0 {
            anyhow::bail!("server.body_limit_bytes 必须大于0");
        }
        if self.download.max_bytes == 0 {
            anyhow::bail!("download.max_bytes 必须大于0");
        }
        if self.download.request_timeout_secs == 0 {
            anyhow::bail!("download.request_timeout_secs 必须大于0");
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            anyhow::bail!("rate_limit.sweep_interval_secs 必须大于0");
        }
        validator::validate_tier("global", &self.rate_limit.global)?;
        validator::validate_tier("auth", &self.rate_limit.auth)?;
        validator::validate_tier("api", &self.rate_limit.api)?;
        validator::validate_prefixes(&self.rate_limit.auth_prefixes)?;
        validator::validate_prefixes(&self.rate_limit.api_prefixes)?;
        if self.sanitizer.max_field_chars == 0 {
            anyhow::bail!("sanitizer.max_field_chars 必须大于0");
        }
        if self.storage.backend == StorageBackend::Firebase && self.storage.bucket.trim().is_empty() {
            anyhow::bail!("firebase 后端需要配置 storage.bucket");
        }
        if self.storage.backend == StorageBackend::Local && self.storage.root.is_empty() {
            anyhow::bail!("local 后端需要配置 storage.root");
        }
        Ok(())
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        let storage = match self.storage.backend {
            StorageBackend::Firebase => format!("firebase ({})", self.storage.bucket),
            StorageBackend::Local => format!("local ({})", self.storage.root),
        };
        format!(
            "配置摘要:\n\
            - 监听: {}:{}\n\
            - 存储后端: {}\n\
            - 下载上限: {} MB\n\
            - 重试: {} 次, 初始等待 {} ms, 时限 {} 秒\n\
            - 限流: global {}/{}s, auth {}/{}s, api {}/{}s",
            self.server.bind,
            self.server.port,
            storage,
            self.download.max_bytes / (1024 * 1024),
            self.download.retry_count,
            self.download.retry_base_delay_ms,
            self.download.request_timeout_secs,
            self.rate_limit.global.max_requests,
            self.rate_limit.global.window_secs,
            self.rate_limit.auth.max_requests,
            self.rate_limit.auth.window_secs,
            self.rate_limit.api.max_requests,
            self.rate_limit.api.window_secs,
        )
    }
}
