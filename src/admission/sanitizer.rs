use bytes::Bytes;
use serde_json::Value;

use crate::config::SanitizerSettings;
use crate::core::error::ApiError;

/// JSON 请求体清洗：逐个检查字符串字段（含嵌套对象和数组）
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_field_chars: usize,
    forbidden_markers: Vec<String>,
}

impl Sanitizer {
    pub fn new(max_field_chars: usize, forbidden_markers: Vec<String>) -> Self {
        Self {
            max_field_chars,
            forbidden_markers,
        }
    }

    pub fn from_settings(settings: &SanitizerSettings) -> Self {
        Self::new(settings.max_field_chars, settings.forbidden_markers.clone())
    }

    /// 先查可疑子串，再去首尾空白，最后查长度
    pub fn sanitize_value(&self, value: &mut Value) -> Result<(), ApiError> {
        match value {
            Value::String(s) => {
                if self.forbidden_markers.iter().any(|m| s.contains(m.as_str())) {
                    return Err(ApiError::SuspiciousInput);
                }
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
                if s.chars().count() > self.max_field_chars {
                    return Err(ApiError::InputTooLong);
                }
                Ok(())
            }
            Value::Array(items) => items.iter_mut().try_for_each(|v| self.sanitize_value(v)),
            Value::Object(map) => map.values_mut().try_for_each(|v| self.sanitize_value(v)),
            _ => Ok(()),
        }
    }

    /// 返回清洗后的请求体；不是 JSON 时返回 `None`，原样交给后面的处理器
    pub fn sanitize_body(&self, body: &[u8]) -> Result<Option<Bytes>, ApiError> {
        if body.is_empty() {
            return Ok(None);
        }
        let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
            return Ok(None);
        };
        self.sanitize_value(&mut value)?;
        // Value 的序列化不会失败
        let cleaned = serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec());
        Ok(Some(Bytes::from(cleaned)))
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::from_settings(&SanitizerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trims_string_fields() {
        let mut value = json!({"storagePath": "  users/42/report.pdf\n", "n": 3});
        Sanitizer::default().sanitize_value(&mut value).unwrap();
        assert_eq!(value, json!({"storagePath": "users/42/report.pdf", "n": 3}));
    }

    #[test]
    fn test_rejects_prototype_markers() {
        let sanitizer = Sanitizer::default();
        for bad in [json!({"a": "__proto__"}), json!({"a": "x.constructor.y"}), json!({"a": {"b": ["ok", "__proto__"]}})] {
            let mut value = bad;
            assert!(matches!(sanitizer.sanitize_value(&mut value), Err(ApiError::SuspiciousInput)));
        }
    }

    #[test]
    fn test_length_boundary_after_trim() {
        let sanitizer = Sanitizer::default();

        let mut exact = json!({ "a": "x".repeat(5000) });
        assert!(sanitizer.sanitize_value(&mut exact).is_ok());

        let mut padded = json!({ "a": format!("   {}   ", "x".repeat(5000)) });
        assert!(sanitizer.sanitize_value(&mut padded).is_ok());

        let mut over = json!({ "a": "x".repeat(5001) });
        assert!(matches!(sanitizer.sanitize_value(&mut over), Err(ApiError::InputTooLong)));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let mut value = json!({ "a": "é".repeat(5000) });
        assert!(Sanitizer::default().sanitize_value(&mut value).is_ok());
    }

    #[test]
    fn test_sanitize_body() {
        let sanitizer = Sanitizer::default();
        let cleaned = sanitizer.sanitize_body(br#"{"storagePath":" a/b "}"#).unwrap().unwrap();
        assert_eq!(cleaned.as_ref(), br#"{"storagePath":"a/b"}"#);

        assert_eq!(sanitizer.sanitize_body(b"").unwrap(), None);
        assert_eq!(sanitizer.sanitize_body(b"not json").unwrap(), None);
        assert!(sanitizer.sanitize_body(br#"{"x":"__proto__"}"#).is_err());
    }
}
