//! Helpers for paginated, sortable list requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
    #[default]
    None,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
            SortDirection::None => "NONE",
        }
    }
}

/// `field,DIRECTION` entries for every field that is actually sorted.
pub fn generate_sort_array<K, I>(sort: I) -> Vec<String>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, SortDirection)>,
{
    sort.into_iter()
        .filter(|(_, direction)| *direction != SortDirection::None)
        .map(|(field, direction)| format!("{},{}", field.as_ref(), direction.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageableRequest {
    pub page: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
}

impl PageableRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: Vec::new(),
        }
    }

    pub fn sorted_by<K, I>(mut self, sort: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, SortDirection)>,
    {
        self.sort = generate_sort_array(sort);
        self
    }

    /// Query parameters for a request descriptor.
    pub fn to_query(&self) -> Map<String, Value> {
        let mut query = Map::new();
        query.insert("page".to_string(), self.page.into());
        query.insert("size".to_string(), self.size.into());
        if !self.sort.is_empty() {
            query.insert("sort".to_string(), self.sort.clone().into());
        }
        query
    }
}

fn is_blank(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => items.iter().any(|item| !is_blank(item)),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Drop falsy entries; arrays lose their null and empty-string items and
/// objects are cleaned recursively.
pub fn remove_empty(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(_, value)| is_truthy(value))
        .map(|(key, value)| {
            let cleaned = match value {
                Value::Array(items) => {
                    Value::Array(items.iter().filter(|item| !is_blank(item)).cloned().collect())
                }
                Value::Object(fields) => Value::Object(remove_empty(fields)),
                other => other.clone(),
            };
            (key.clone(), cleaned)
        })
        .collect()
}

/// Follow a dotted path through objects (and arrays, by index).
pub fn get_value_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(fields) => fields.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sort_array_skips_unsorted_fields() {
        let sort = generate_sort_array([
            ("name", SortDirection::None),
            ("age", SortDirection::Desc),
            ("user.address.city", SortDirection::Asc),
        ]);
        assert_eq!(sort, vec!["age,DESC", "user.address.city,ASC"]);
        assert!(generate_sort_array([("name", SortDirection::None)]).is_empty());
    }

    #[test]
    fn pageable_request_becomes_query() {
        let request = PageableRequest::new(2, 20).sorted_by([("name", SortDirection::Asc)]);
        assert_eq!(
            Value::Object(request.to_query()),
            json!({"page": 2, "size": 20, "sort": ["name,ASC"]})
        );
        assert_eq!(
            Value::Object(PageableRequest::new(0, 10).to_query()),
            json!({"page": 0, "size": 10})
        );
    }

    #[test]
    fn remove_empty_drops_falsy_values() {
        let input = map(json!({"a": 1, "b": "", "c": null, "e": 0, "f": false, "g": "valid"}));
        assert_eq!(remove_empty(&input), map(json!({"a": 1, "g": "valid"})));
        assert!(remove_empty(&Map::new()).is_empty());
    }

    #[test]
    fn remove_empty_cleans_arrays_and_objects() {
        let input = map(json!({
            "a": [],
            "b": [1, 2, 3],
            "c": [null, "", "valid"],
            "d": {"x": null, "y": 2},
            "e": {},
        }));
        assert_eq!(
            remove_empty(&input),
            map(json!({"b": [1, 2, 3], "c": ["valid"], "d": {"y": 2}}))
        );
    }

    #[test]
    fn value_by_path_walks_nested_fields() {
        let data = json!({
            "user": {"name": "Alice", "address": {"city": "Wonderland", "zip": 12345}},
            "tags": ["a", "b"],
            "active": true,
        });
        assert_eq!(get_value_by_path(&data, "active"), Some(&json!(true)));
        assert_eq!(get_value_by_path(&data, "user.address.zip"), Some(&json!(12345)));
        assert_eq!(get_value_by_path(&data, "tags.1"), Some(&json!("b")));
        assert_eq!(get_value_by_path(&data, "user.phone"), None);
        assert_eq!(get_value_by_path(&data, "active.deeper"), None);
    }
}
