//! Conversions between Terraform values, the predicate model and the API shape
//!
//! Child order and comparison triples are preserved in both directions. Empty
//! child lists are sent to the API as absent. An unset comparison field is
//! omitted on the wire and null in state; `""` is a present value.

use super::{FilterError, FilterRoot, PredicateNode};
use crate::api::Filter;
use std::collections::HashMap;
use tfplug::{AttributePath, Diagnostic, Dynamic};

const SEARCH_FIELD: &str = "search_field";
const SEARCH_TYPE: &str = "search_type";
const SEARCH_VALUE: &str = "search_value";
const AND: &str = "and";
const OR: &str = "or";

/// Read a root filter from configuration or plan.
///
/// Problems are reported as diagnostics scoped to the offending node. Unknown
/// parts are skipped so the same function can back config validation.
pub fn root_from_config(
    value: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<FilterRoot> {
    match value {
        Dynamic::Null | Dynamic::Unknown => None,
        Dynamic::Map(fields) => Some(FilterRoot {
            and: children_from_config(fields.get(AND), &path.clone().attribute(AND), diagnostics),
            or: children_from_config(fields.get(OR), &path.clone().attribute(OR), diagnostics),
        }),
        other => {
            diagnostics.push(type_error(path, "object", other));
            None
        }
    }
}

fn children_from_config(
    value: Option<&Dynamic>,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<PredicateNode> {
    let items = match value {
        None | Some(Dynamic::Null) | Some(Dynamic::Unknown) => return Vec::new(),
        Some(Dynamic::List(items)) => items,
        Some(other) => {
            diagnostics.push(type_error(path, "list", other));
            return Vec::new();
        }
    };

    let mut nodes = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = path.clone().index(i as i64);
        match item {
            Dynamic::Unknown => {}
            Dynamic::Null => diagnostics.push(
                Diagnostic::error(
                    "Invalid filter condition",
                    "Filter condition lists must not contain null elements",
                )
                .with_attribute(item_path),
            ),
            item => {
                if let Some(node) = node_from_config(item, &item_path, diagnostics) {
                    nodes.push(node);
                }
            }
        }
    }
    nodes
}

fn node_from_config(
    value: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<PredicateNode> {
    let Dynamic::Map(fields) = value else {
        diagnostics.push(type_error(path, "object", value));
        return None;
    };

    let mut leaf = |name: &str| match fields.get(name) {
        None | Some(Dynamic::Null) | Some(Dynamic::Unknown) => None,
        Some(Dynamic::String(s)) => Some(s.clone()),
        Some(other) => {
            diagnostics.push(type_error(&path.clone().attribute(name), "string", other));
            None
        }
    };
    let field = leaf(SEARCH_FIELD);
    let search_type = leaf(SEARCH_TYPE);
    let search_value = leaf(SEARCH_VALUE);

    let and = children_from_config(fields.get(AND), &path.clone().attribute(AND), diagnostics);
    let or = children_from_config(fields.get(OR), &path.clone().attribute(OR), diagnostics);

    let is_comparison = field.is_some() || search_type.is_some() || search_value.is_some();
    if is_comparison && (!and.is_empty() || !or.is_empty()) {
        diagnostics.push(
            Diagnostic::error(
                "Invalid filter condition",
                FilterError::MixedNode(path.to_string()).to_string(),
            )
            .with_attribute(path.clone()),
        );
        return None;
    }

    Some(if is_comparison {
        PredicateNode::Comparison {
            field,
            search_type,
            value: search_value,
        }
    } else {
        PredicateNode::Group { and, or }
    })
}

fn type_error(path: &AttributePath, expected: &str, actual: &Dynamic) -> Diagnostic {
    Diagnostic::error(
        "Invalid filter condition",
        format!("Expected {}, got {}", expected, actual.type_name()),
    )
    .with_attribute(path.clone())
}

/// Model to API shape; nil stays nil
pub fn to_remote(root: Option<&FilterRoot>) -> Option<Filter> {
    root.map(|root| Filter {
        and: nodes_to_remote(&root.and),
        or: nodes_to_remote(&root.or),
        ..Default::default()
    })
}

fn nodes_to_remote(nodes: &[PredicateNode]) -> Option<Vec<Filter>> {
    if nodes.is_empty() {
        None
    } else {
        Some(nodes.iter().map(node_to_remote).collect())
    }
}

fn node_to_remote(node: &PredicateNode) -> Filter {
    match node {
        PredicateNode::Comparison {
            field,
            search_type,
            value,
        } => Filter {
            search_field: field.clone(),
            search_type: search_type.clone(),
            search_value: value.clone(),
            ..Default::default()
        },
        PredicateNode::Group { and, or } => Filter {
            and: nodes_to_remote(and),
            or: nodes_to_remote(or),
            ..Default::default()
        },
    }
}

/// API shape to model; nil stays nil.
///
/// A node that carries comparison fields next to child conditions is an error.
pub fn from_remote(filter: Option<&Filter>) -> Result<Option<FilterRoot>, FilterError> {
    let Some(filter) = filter else {
        return Ok(None);
    };

    if filter.has_leaf_fields() {
        return Err(FilterError::MixedNode("the filter root".to_string()));
    }

    Ok(Some(FilterRoot {
        and: nodes_from_remote(filter.and.as_deref(), &AttributePath::new(AND))?,
        or: nodes_from_remote(filter.or.as_deref(), &AttributePath::new(OR))?,
    }))
}

fn nodes_from_remote(
    filters: Option<&[Filter]>,
    path: &AttributePath,
) -> Result<Vec<PredicateNode>, FilterError> {
    filters
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, filter)| node_from_remote(filter, &path.clone().index(i as i64)))
        .collect()
}

fn node_from_remote(filter: &Filter, path: &AttributePath) -> Result<PredicateNode, FilterError> {
    let and = nodes_from_remote(filter.and.as_deref(), &path.clone().attribute(AND))?;
    let or = nodes_from_remote(filter.or.as_deref(), &path.clone().attribute(OR))?;

    if !filter.has_leaf_fields() {
        return Ok(PredicateNode::Group { and, or });
    }
    if !and.is_empty() || !or.is_empty() {
        return Err(FilterError::MixedNode(path.to_string()));
    }

    Ok(PredicateNode::Comparison {
        field: filter.search_field.clone(),
        search_type: filter.search_type.clone(),
        value: filter.search_value.clone(),
    })
}

/// Model to Terraform state.
///
/// `prior` is the filter value the state is replacing (planned value on
/// create/update, current state on read). Where the model has no children
/// but `prior` held an empty list at the same position, the empty list is
/// kept, so `or = []` in configuration does not diff against null.
pub fn root_to_state(
    root: Option<&FilterRoot>,
    prior: &Dynamic,
    max_depth: usize,
) -> Result<Dynamic, FilterError> {
    let Some(root) = root else {
        return Ok(Dynamic::Null);
    };

    let mut fields = HashMap::new();
    fields.insert(
        AND.to_string(),
        children_to_state(
            &root.and,
            prior_field(Some(prior), AND),
            1,
            max_depth,
            &AttributePath::new(AND),
        )?,
    );
    fields.insert(
        OR.to_string(),
        children_to_state(
            &root.or,
            prior_field(Some(prior), OR),
            1,
            max_depth,
            &AttributePath::new(OR),
        )?,
    );
    Ok(Dynamic::Map(fields))
}

fn children_to_state(
    nodes: &[PredicateNode],
    prior: Option<&Dynamic>,
    depth: usize,
    max_depth: usize,
    path: &AttributePath,
) -> Result<Dynamic, FilterError> {
    if nodes.is_empty() {
        return Ok(match prior {
            Some(Dynamic::List(items)) if items.is_empty() => Dynamic::List(Vec::new()),
            _ => Dynamic::Null,
        });
    }
    if depth > max_depth {
        return Err(FilterError::TooDeep {
            path: path.to_string(),
            max_depth,
        });
    }

    let prior_items = prior.and_then(Dynamic::as_list);
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            node_to_state(
                node,
                prior_items.and_then(|items| items.get(i)),
                depth,
                max_depth,
                &path.clone().index(i as i64),
            )
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Dynamic::List)
}

fn node_to_state(
    node: &PredicateNode,
    prior: Option<&Dynamic>,
    depth: usize,
    max_depth: usize,
    path: &AttributePath,
) -> Result<Dynamic, FilterError> {
    let (leaf, and, or): (Option<[&Option<String>; 3]>, &[PredicateNode], &[PredicateNode]) = match node {
        PredicateNode::Comparison {
            field,
            search_type,
            value,
        } => (Some([field, search_type, value]), &[], &[]),
        PredicateNode::Group { and, or } => (None, and.as_slice(), or.as_slice()),
    };

    let mut fields = HashMap::new();
    for (i, name) in [SEARCH_FIELD, SEARCH_TYPE, SEARCH_VALUE].into_iter().enumerate() {
        let value = leaf
            .and_then(|values| values[i].clone())
            .map_or(Dynamic::Null, Dynamic::String);
        fields.insert(name.to_string(), value);
    }

    if depth < max_depth {
        fields.insert(
            AND.to_string(),
            children_to_state(
                and,
                prior_field(prior, AND),
                depth + 1,
                max_depth,
                &path.clone().attribute(AND),
            )?,
        );
        fields.insert(
            OR.to_string(),
            children_to_state(
                or,
                prior_field(prior, OR),
                depth + 1,
                max_depth,
                &path.clone().attribute(OR),
            )?,
        );
    } else if !and.is_empty() || !or.is_empty() {
        return Err(FilterError::TooDeep {
            path: path.to_string(),
            max_depth,
        });
    }

    Ok(Dynamic::Map(fields))
}

fn prior_field<'a>(prior: Option<&'a Dynamic>, name: &str) -> Option<&'a Dynamic> {
    prior.and_then(Dynamic::as_map).and_then(|fields| fields.get(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MAX_FILTER_DEPTH;

    fn comparison(field: &str, search_type: &str, value: &str) -> Dynamic {
        Dynamic::Map(HashMap::from([
            (SEARCH_FIELD.to_string(), Dynamic::from(field)),
            (SEARCH_TYPE.to_string(), Dynamic::from(search_type)),
            (SEARCH_VALUE.to_string(), Dynamic::from(value)),
            (AND.to_string(), Dynamic::Null),
            (OR.to_string(), Dynamic::Null),
        ]))
    }

    fn group(and: Dynamic, or: Dynamic) -> Dynamic {
        Dynamic::Map(HashMap::from([
            (SEARCH_FIELD.to_string(), Dynamic::Null),
            (SEARCH_TYPE.to_string(), Dynamic::Null),
            (SEARCH_VALUE.to_string(), Dynamic::Null),
            (AND.to_string(), and),
            (OR.to_string(), or),
        ]))
    }

    fn root(and: Dynamic, or: Dynamic) -> Dynamic {
        Dynamic::Map(HashMap::from([(AND.to_string(), and), (OR.to_string(), or)]))
    }

    fn parse(value: &Dynamic) -> Option<FilterRoot> {
        let mut diagnostics = Vec::new();
        let root = root_from_config(value, &AttributePath::new("filter"), &mut diagnostics);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        root
    }

    fn remote_leaf(field: &str, search_type: &str, value: &str) -> Filter {
        Filter {
            search_field: Some(field.to_string()),
            search_type: Some(search_type.to_string()),
            search_value: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_or_round_trips_through_absent_list() {
        let config = root(
            Dynamic::List(vec![comparison("a", "EQ", "1")]),
            Dynamic::List(vec![]),
        );

        let remote = to_remote(parse(&config).as_ref()).unwrap();
        assert_eq!(
            remote,
            Filter {
                and: Some(vec![remote_leaf("a", "EQ", "1")]),
                or: None,
                ..Default::default()
            }
        );

        let back = from_remote(Some(&remote)).unwrap();
        let state = root_to_state(back.as_ref(), &config, MAX_FILTER_DEPTH).unwrap();
        assert_eq!(state, config);
    }

    #[test]
    fn absent_list_without_prior_becomes_null() {
        let remote = Filter {
            and: Some(vec![remote_leaf("a", "EQ", "1")]),
            ..Default::default()
        };

        let back = from_remote(Some(&remote)).unwrap();
        let state = root_to_state(back.as_ref(), &Dynamic::Null, MAX_FILTER_DEPTH).unwrap();

        assert_eq!(
            state,
            root(Dynamic::List(vec![comparison("a", "EQ", "1")]), Dynamic::Null)
        );
    }

    #[test]
    fn nested_tree_round_trips() {
        let config = root(
            Dynamic::List(vec![
                comparison("region", "EQ", "us-east-1"),
                group(
                    Dynamic::Null,
                    Dynamic::List(vec![
                        comparison("tag", "CONTAINS", "prod"),
                        comparison("tag", "CONTAINS", "staging"),
                        group(
                            Dynamic::List(vec![comparison("os", "NEQ", "windows")]),
                            Dynamic::Null,
                        ),
                    ]),
                ),
            ]),
            Dynamic::Null,
        );

        let model = parse(&config);
        let remote = to_remote(model.as_ref());
        let back = from_remote(remote.as_ref()).unwrap();

        assert_eq!(back, model);
        assert_eq!(
            root_to_state(back.as_ref(), &config, MAX_FILTER_DEPTH).unwrap(),
            config
        );
    }

    #[test]
    fn nil_propagates_both_ways() {
        assert_eq!(parse(&Dynamic::Null), None);
        assert_eq!(to_remote(None), None);
        assert_eq!(from_remote(None).unwrap(), None);
        assert_eq!(
            root_to_state(None, &Dynamic::Null, MAX_FILTER_DEPTH).unwrap(),
            Dynamic::Null
        );
    }

    #[test]
    fn child_order_is_preserved() {
        for count in [0usize, 1, 4] {
            let nodes: Vec<PredicateNode> = (0..count)
                .map(|i| PredicateNode::comparison(&format!("f{}", i), "EQ", &i.to_string()))
                .collect();
            let model = FilterRoot {
                and: Vec::new(),
                or: nodes.clone(),
            };

            let remote = to_remote(Some(&model)).unwrap();
            let fields: Vec<String> = remote
                .or
                .unwrap_or_default()
                .into_iter()
                .filter_map(|f| f.search_field)
                .collect();
            let expected: Vec<String> = (0..count).map(|i| format!("f{}", i)).collect();
            assert_eq!(fields, expected);

            let back = from_remote(Some(&to_remote(Some(&model)).unwrap()))
                .unwrap()
                .unwrap();
            assert_eq!(back.or, nodes);
        }
    }

    #[test]
    fn missing_remote_leaf_fields_stay_absent() {
        let remote = Filter {
            and: Some(vec![Filter {
                search_field: Some("name".to_string()),
                search_value: Some(String::new()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let back = from_remote(Some(&remote)).unwrap().unwrap();
        assert_eq!(
            back.and,
            vec![PredicateNode::Comparison {
                field: Some("name".to_string()),
                search_type: None,
                value: Some(String::new()),
            }]
        );

        let state = root_to_state(Some(&back), &Dynamic::Null, MAX_FILTER_DEPTH).unwrap();
        let leaf = &state.as_map().unwrap()[AND].as_list().unwrap()[0];
        assert_eq!(leaf.as_map().unwrap()[SEARCH_TYPE], Dynamic::Null);
        assert_eq!(leaf.as_map().unwrap()[SEARCH_VALUE], Dynamic::from(""));
    }

    #[test]
    fn partial_leaf_round_trips_without_empty_strings() {
        let mut leaf = match comparison("name", "EXISTS", "") {
            Dynamic::Map(fields) => fields,
            _ => unreachable!(),
        };
        leaf.insert(SEARCH_VALUE.to_string(), Dynamic::Null);
        let config = root(Dynamic::List(vec![Dynamic::Map(leaf)]), Dynamic::Null);

        let remote = to_remote(parse(&config).as_ref()).unwrap();
        assert_eq!(
            remote.and.as_deref().unwrap()[0],
            Filter {
                search_field: Some("name".to_string()),
                search_type: Some("EXISTS".to_string()),
                ..Default::default()
            }
        );
        assert_eq!(
            serde_json::to_value(&remote).unwrap(),
            serde_json::json!({"and": [{"searchField": "name", "searchType": "EXISTS"}]})
        );

        let back = from_remote(Some(&remote)).unwrap();
        assert_eq!(
            root_to_state(back.as_ref(), &config, MAX_FILTER_DEPTH).unwrap(),
            config
        );
    }

    #[test]
    fn explicit_empty_value_is_kept() {
        let config = root(Dynamic::List(vec![comparison("owner", "EQ", "")]), Dynamic::Null);

        let remote = to_remote(parse(&config).as_ref()).unwrap();
        assert_eq!(remote.and.as_deref().unwrap()[0], remote_leaf("owner", "EQ", ""));

        let back = from_remote(Some(&remote)).unwrap();
        assert_eq!(
            root_to_state(back.as_ref(), &config, MAX_FILTER_DEPTH).unwrap(),
            config
        );
    }

    #[test]
    fn mixed_config_node_is_rejected() {
        let mut mixed = match comparison("a", "EQ", "1") {
            Dynamic::Map(fields) => fields,
            _ => unreachable!(),
        };
        mixed.insert(
            AND.to_string(),
            Dynamic::List(vec![comparison("b", "EQ", "2")]),
        );
        let config = root(Dynamic::List(vec![Dynamic::Map(mixed)]), Dynamic::Null);

        let mut diagnostics = Vec::new();
        let parsed = root_from_config(&config, &AttributePath::new("filter"), &mut diagnostics);

        assert_eq!(parsed.unwrap().and, vec![]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some(AttributePath::new("filter").attribute("and").index(0))
        );
    }

    #[test]
    fn null_list_element_is_rejected() {
        let config = root(
            Dynamic::List(vec![comparison("a", "EQ", "1"), Dynamic::Null]),
            Dynamic::Null,
        );

        let mut diagnostics = Vec::new();
        root_from_config(&config, &AttributePath::new("filter"), &mut diagnostics);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_ref().unwrap().to_string(), "filter.and[1]");
    }

    #[test]
    fn mixed_remote_node_is_rejected() {
        let mut mixed = remote_leaf("a", "EQ", "1");
        mixed.or = Some(vec![remote_leaf("b", "EQ", "2")]);
        let remote = Filter {
            and: Some(vec![mixed]),
            ..Default::default()
        };

        assert_eq!(
            from_remote(Some(&remote)),
            Err(FilterError::MixedNode("and[0]".to_string()))
        );
    }

    #[test]
    fn remote_nesting_beyond_schema_depth_is_an_error() {
        let remote = Filter {
            and: Some(vec![Filter {
                or: Some(vec![remote_leaf("a", "EQ", "1")]),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let model = from_remote(Some(&remote)).unwrap();
        assert!(matches!(
            root_to_state(model.as_ref(), &Dynamic::Null, 1),
            Err(FilterError::TooDeep { .. })
        ));
        assert!(root_to_state(model.as_ref(), &Dynamic::Null, 2).is_ok());
    }

    #[test]
    fn last_level_nodes_have_no_child_attributes() {
        let model = FilterRoot {
            and: vec![PredicateNode::comparison("a", "EQ", "1")],
            or: Vec::new(),
        };

        let state = root_to_state(Some(&model), &Dynamic::Null, 1).unwrap();
        let node = &state.as_map().unwrap()[AND].as_list().unwrap()[0];
        assert!(node.as_map().unwrap().get(AND).is_none());
    }
}
