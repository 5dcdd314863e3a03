use serde::{Deserialize, Serialize};

/// Stripe list envelope (`{"object": "list", "data": [...]}`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct List<T> {
    #[serde(default)]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self { data: Vec::new(), has_more: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Item {
        id: String,
    }

    #[test]
    fn missing_data_defaults_to_empty_for_non_default_items() {
        let list: List<Item> = serde_json::from_value(json!({"object": "list"})).unwrap();
        assert!(list.data.is_empty());
        assert!(!list.has_more);

        let list: List<Item> = serde_json::from_value(json!({"data": [{"id": "re_1"}], "has_more": true})).unwrap();
        assert_eq!(list.data, vec![Item { id: "re_1".into() }]);
        assert!(list.has_more);
    }
}
