//! Common types shared by the CloudSec API areas

use serde::{Deserialize, Serialize};

/// Envelope some endpoints wrap their payload in
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Error body returned by the platform on 4xx responses
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).or_else(|| {
            if self.errors.is_empty() {
                None
            } else {
                Some(self.errors.join("; "))
            }
        })
    }
}

/// Remote filter expression.
///
/// Leaf nodes carry the `search*` triple, group nodes carry `and`/`or`.
/// The API does not enforce that distinction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_value: Option<String>,
}

impl Filter {
    pub fn has_leaf_fields(&self) -> bool {
        self.search_field.is_some() || self.search_type.is_some() || self.search_value.is_some()
    }
}

/// Build a query string from optional parameters, skipping unset ones
pub fn query_string(params: &[(&str, Option<&str>)]) -> String {
    let pairs: Vec<String> = params
        .iter()
        .filter_map(|(key, value)| {
            value.map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}
