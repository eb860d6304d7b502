use serde_json::Value;

/// Masks sensitive fields in JSON payloads before they are logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Keys are compared case-insensitively with `_` and `-` ignored, so
/// `client_secret` and `clientSecret` are both caught.
pub fn is_sensitive_field(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    matches!(
        normalized.as_str(),
        "clientsecret"
            | "secret"
            | "secretkey"
            | "password"
            | "token"
            | "apikey"
            | "authorization"
            | "fundingaccount"
            | "recipient"
            | "jwtsecret"
            | "webhooksecret"
    )
}

/// Keeps the first and last four characters of long strings.
pub fn mask_str(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    } else {
        "****".to_string()
    }
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_str(s)),
        _ => Value::String("****".to_string()),
    }
}
