//! CLI: 命令行参数与配置加载
//!
//! - `storeproxy`：使用平台默认配置文件启动
//! - `storeproxy -c proxy.toml`：指定配置文件
//! - `storeproxy -e`：编辑配置文件
//! - `storeproxy --backend local --storage-root ./data -p 3000`
//!
//! 平台默认配置路径：
//! - Windows: `%APPDATA%/storeproxy/storeproxy.toml`
//! - macOS: `~/Library/Application Support/storeproxy/storeproxy.toml`
//! - Linux: `~/.config/storeproxy/storeproxy.toml`

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::env;

use crate::config::{Config, StorageBackend};

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/storeproxy/storeproxy.toml", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/storeproxy/storeproxy.toml", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/storeproxy/storeproxy.toml", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Firebase,
    Local,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Firebase => StorageBackend::Firebase,
            BackendArg::Local => StorageBackend::Local,
        }
    }
}

/// storeproxy 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(
    name = "storeproxy",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    about = "对象存储下载代理，带重试退避与分级限流",
    long_about = "接收 POST /download 请求，从对象存储读取文件并原样返回。\n瞬时错误按指数退避重试，所有路由经过三级限流和请求体清洗。\n\n示例：\n  storeproxy\n  storeproxy -e\n  storeproxy -c /path/to/storeproxy.toml -p 3000\n  storeproxy --backend local --storage-root ./data\n"
)]
pub struct Args {
    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path())]
    pub config: String,

    /// 用系统默认编辑器打开配置文件并退出
    #[arg(short = 'e', long = "edit")]
    pub edit_config: bool,

    /// 监听地址，覆盖配置文件
    #[arg(short = 'b', long)]
    pub bind: Option<String>,

    /// 监听端口，覆盖配置文件和 PORT 环境变量
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// 存储后端
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// local 后端的根目录
    #[arg(long)]
    pub storage_root: Option<String>,

    /// firebase 后端的存储桶
    #[arg(long)]
    pub bucket: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

impl Args {
    /// 解析命令行参数并加载配置：命令行 > 环境变量 > 配置文件 > 默认值
    pub fn parse_args() -> Result<(Self, Config)> {
        let args = Args::parse();

        if args.edit_config {
            if !std::path::Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.resolve_config()?;
        Ok((args, config))
    }

    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?;
        config.apply_env();
        config.merge_from_args(self);
        config.validate().context("配置无效")?;
        Ok(config)
    }
}
