use anyhow::Result;
use serde_json::Value;

use crate::config::TierSettings;

/// 取出请求体中的 `storagePath`：缺失、null、非字符串或空串都视为无效
pub fn extract_storage_path(body: &Value) -> Option<&str> {
    body.get("storagePath")
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
}

pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        anyhow::bail!("端口必须大于0");
    }
    Ok(())
}

pub fn validate_tier(name: &str, tier: &TierSettings) -> Result<()> {
    if tier.window_secs == 0 {
        anyhow::bail!("{} 限流窗口必须大于0", name);
    }
    if tier.max_requests == 0 {
        anyhow::bail!("{} 限流上限必须大于0", name);
    }
    if tier.message.is_empty() {
        anyhow::bail!("{} 限流提示不能为空", name);
    }
    Ok(())
}

pub fn validate_prefixes(prefixes: &[String]) -> Result<()> {
    if let Some(bad) = prefixes.iter().find(|p| !p.starts_with('/')) {
        anyhow::bail!("路由前缀必须以 / 开头: {}", bad);
    }
    Ok(())
}
