//! storeproxy: 对象存储下载代理
//!
//! - `admission`: 分级限流与请求体清洗中间件
//! - `core`: 重试退避、错误分类、对象获取
//! - `storage`: 存储后端（Firebase REST / 本地目录）
//! - `server`: HTTP 路由与下载端点

pub mod admission;
pub mod cli;
pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;
