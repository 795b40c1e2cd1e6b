//! Recursive filter predicates
//!
//! A filter is a boolean expression built from nested `and`/`or` groups with
//! `(search_field, search_type, search_value)` comparisons at the leaves. It
//! appears in Terraform configuration as a bounded-depth nested attribute and
//! on the wire as [`crate::api::Filter`].

pub mod convert;
pub mod schema;

pub use convert::{from_remote, root_from_config, root_to_state, to_remote};
pub use schema::{filter_root_attribute, predicate_node_attributes, MAX_FILTER_DEPTH};

/// Top level of a filter: children only, no comparison of its own
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRoot {
    pub and: Vec<PredicateNode>,
    pub or: Vec<PredicateNode>,
}

/// A condition node. Comparison fields left unset stay `None` end to end,
/// so an absent field never comes back as an empty string.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    Comparison {
        field: Option<String>,
        search_type: Option<String>,
        value: Option<String>,
    },
    Group {
        and: Vec<PredicateNode>,
        or: Vec<PredicateNode>,
    },
}

impl PredicateNode {
    pub fn comparison(field: &str, search_type: &str, value: &str) -> Self {
        PredicateNode::Comparison {
            field: Some(field.to_string()),
            search_type: Some(search_type.to_string()),
            value: Some(value.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("filter node at {0} has both comparison fields and nested and/or conditions")]
    MixedNode(String),

    #[error("filter nesting at {path} exceeds the maximum depth of {max_depth}")]
    TooDeep { path: String, max_depth: usize },
}
