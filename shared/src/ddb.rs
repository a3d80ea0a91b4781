//! Small helpers for reading DynamoDB items back into domain values.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

pub type Attrs = HashMap<String, AttributeValue>;

pub fn attr_s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub fn attr_n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub fn attr_bool(value: bool) -> AttributeValue {
    AttributeValue::Bool(value)
}

pub fn get_s(item: &Attrs, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

pub fn get_s_opt(item: &Attrs, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

pub fn get_n_i64(item: &Attrs, key: &str) -> i64 {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or(0)
}

pub fn get_bool(item: &Attrs, key: &str) -> bool {
    item.get(key)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

pub fn get_string_list(item: &Attrs, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(|v| v.as_l().ok())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_s().ok().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn string_list_attr(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().map(|s| attr_s(s.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_missing_attributes_as_defaults() {
        let item: Attrs = HashMap::new();
        assert_eq!(get_s(&item, "title"), "");
        assert_eq!(get_s_opt(&item, "title"), None);
        assert_eq!(get_n_i64(&item, "points"), 0);
        assert!(!get_bool(&item, "is_read"));
        assert!(get_string_list(&item, "image_refs").is_empty());
    }

    #[test]
    fn string_list_round_trips() {
        let refs = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        let mut item: Attrs = HashMap::new();
        item.insert("image_refs".to_string(), string_list_attr(&refs));
        assert_eq!(get_string_list(&item, "image_refs"), refs);
    }
}
