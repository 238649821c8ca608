//! 환경 변수 치환
//!
//! 문자열 값 안의 `${VAR}` / `$VAR`를 환경 변수 값으로 바꾼다.
//! - `$$`는 `$` 하나로
//! - 없는 변수는 원문 그대로 둔다

use serde_json::Value;

/// 구조 전체(객체, 배열)를 재귀적으로 돌며 문자열 값을 치환
pub fn expand_env_vars(value: Value) -> Value {
    expand_with(value, &|name| std::env::var(name).ok())
}

/// 단일 문자열 치환 (lookup 주입 가능)
pub fn expand_env_str(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if is_identifier(name) {
                    match lookup(name) {
                        Some(v) => out.push_str(&v),
                        None => out.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &braced[end + 1..];
                    continue;
                }
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = identifier_len(after);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        let name = &after[..len];
        match lookup(name) {
            Some(v) => out.push_str(&v),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

fn expand_with(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => Value::String(expand_env_str(&s, lookup)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| expand_with(v, lookup)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_with(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

fn identifier_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c == '_' || c.is_ascii_alphabetic()
        } else {
            c == '_' || c.is_ascii_alphanumeric()
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len()
}
