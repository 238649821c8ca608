//! 민감 필드 마스킹 (설정 요약 출력용)

use serde_json::Value;

/// 마스킹된 값
pub const HIDDEN_VALUE: &str = "***hidden***";

const SENSITIVE_MARKERS: &[&str] = &["password", "token", "secret", "key", "api_key"];

/// 필드 이름이 민감 정보로 보이는지
pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|m| lower.contains(m))
}

/// 민감 필드 값을 `HIDDEN_VALUE`로 바꾼 사본 (중첩 객체 포함)
pub fn redact_sensitive(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if is_sensitive_field(&k) && !v.is_object() {
                        (k, Value::String(HIDDEN_VALUE.to_string()))
                    } else {
                        (k, redact_sensitive(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_sensitive).collect()),
        other => other,
    }
}
