use serde_json::Value;

/// Normalize a caller-supplied parameter value to the wire string form
/// mandated by §3 I7 / §4.2 "Parameter normalization".
///
/// - strings pass through unchanged.
/// - booleans become `"true"`/`"false"`.
/// - numbers become their decimal string form.
/// - a list of strings is joined with `,` — the multi-select vocabulary
///   convention the original service's wire format used (SPEC_FULL §C.1),
///   distinct from the generic "compact JSON" fallback below.
/// - any other array/object becomes compact JSON text.
/// - null becomes the empty string.
pub fn normalize_param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Array(items) if items.iter().all(|v| v.is_string()) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(","),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_pass_through() {
        assert_eq!(normalize_param_value(&json!("abc")), "abc");
    }

    #[test]
    fn booleans_become_lowercase_words() {
        assert_eq!(normalize_param_value(&json!(true)), "true");
        assert_eq!(normalize_param_value(&json!(false)), "false");
    }

    #[test]
    fn numbers_become_decimal_strings() {
        assert_eq!(normalize_param_value(&json!(42)), "42");
        assert_eq!(normalize_param_value(&json!(3.5)), "3.5");
    }

    #[test]
    fn null_becomes_empty_string() {
        assert_eq!(normalize_param_value(&Value::Null), "");
    }

    #[test]
    fn string_list_joins_with_comma() {
        assert_eq!(
            normalize_param_value(&json!(["a", "b", "c"])),
            "a,b,c"
        );
    }

    #[test]
    fn mixed_array_falls_back_to_json() {
        assert_eq!(normalize_param_value(&json!([1, "x"])), "[1,\"x\"]");
    }

    #[test]
    fn object_falls_back_to_compact_json() {
        assert_eq!(normalize_param_value(&json!({"a": 1})), "{\"a\":1}");
    }
}
