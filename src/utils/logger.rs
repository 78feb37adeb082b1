use chrono::Local;
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// 初始化全局日志
///
/// 格式与之前的文件日志保持一致：`2024-01-01 12:00:00 [INFO] - 消息`。
/// `RUST_LOG` 优先于 `level`；配置了 `log_file` 时追加写入该文件。
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> std::io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        builder.target(Target::Pipe(Box::new(open_log_file(path)?)));
    }

    // 重复初始化（例如测试中）不算错误，交给已有的 logger 记一笔
    if let Err(e) = builder.try_init() {
        log::debug!("日志已初始化，忽略本次设置: {}", e);
    }
    Ok(())
}

fn open_log_file(path: &str) -> std::io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
