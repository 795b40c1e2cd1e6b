//! Bounded-depth schema for filter predicates
//!
//! Terraform schemas cannot be recursive, so the node structure is unrolled to a
//! fixed depth. Nodes at the last level have no `and`/`or` attributes, and
//! configuration nesting deeper than that is rejected by Terraform itself.

use tfplug::schema::{Attribute, NestedType, ObjectNestingMode};
use tfplug::{AttributeBuilder, AttributeType};

pub const MAX_FILTER_DEPTH: usize = 10;

/// Attributes of a predicate node at `depth` (root children are depth 1)
pub fn predicate_node_attributes(depth: usize, max_depth: usize) -> Vec<Attribute> {
    let mut attributes = vec![
        AttributeBuilder::new("search_field", AttributeType::String)
            .description("Field to compare")
            .optional()
            .build(),
        AttributeBuilder::new("search_type", AttributeType::String)
            .description("Comparison operator, e.g. EQ, NEQ, CONTAINS")
            .optional()
            .build(),
        AttributeBuilder::new("search_value", AttributeType::String)
            .description("Value to compare against")
            .optional()
            .build(),
    ];

    if depth < max_depth {
        attributes.push(children_attribute("and", depth + 1, max_depth));
        attributes.push(children_attribute("or", depth + 1, max_depth));
    }

    attributes
}

/// Root filter attribute: a single object holding only `and`/`or`
pub fn filter_root_attribute(name: &str, max_depth: usize) -> AttributeBuilder {
    let nested = NestedType::new(
        ObjectNestingMode::Single,
        vec![
            children_attribute("and", 1, max_depth),
            children_attribute("or", 1, max_depth),
        ],
    );

    AttributeBuilder::nested(name, nested)
}

fn children_attribute(name: &str, depth: usize, max_depth: usize) -> Attribute {
    let description = match name {
        "and" => "Conditions that must all match",
        _ => "Conditions of which at least one must match",
    };

    AttributeBuilder::nested(
        name,
        NestedType::new(
            ObjectNestingMode::List,
            predicate_node_attributes(depth, max_depth),
        ),
    )
    .description(description)
    .optional()
    .build()
}
