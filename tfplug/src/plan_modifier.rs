//! Attribute plan modifiers
//!
//! Plan modifiers run during PlanResourceChange, after Terraform has proposed a
//! new state, and can:
//! - Modify the planned value of their attribute
//! - Mark the attribute as requiring replacement
//! - Add warnings or errors to the plan

use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

/// Everything a modifier may consult: the attribute's own values plus the whole
/// configuration, prior state and plan of the resource for sibling lookups.
#[derive(Debug, Clone)]
pub struct PlanModifyRequest {
    pub attribute_path: AttributePath,
    pub config_value: Dynamic,
    pub state_value: Dynamic,
    pub plan_value: Dynamic,
    pub config: DynamicValue,
    /// Null when the resource is being created
    pub state: DynamicValue,
    pub plan: DynamicValue,
}

impl PlanModifyRequest {
    pub fn new(
        attribute_path: AttributePath,
        config: DynamicValue,
        state: DynamicValue,
        plan: DynamicValue,
    ) -> Self {
        let value_at = |dv: &DynamicValue| dv.get(&attribute_path).unwrap_or(Dynamic::Null);

        Self {
            config_value: value_at(&config),
            state_value: value_at(&state),
            plan_value: value_at(&plan),
            attribute_path,
            config,
            state,
            plan,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanModifyResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifyResponse {
    /// Response that leaves the planned value as it is
    pub fn unchanged(request: &PlanModifyRequest) -> Self {
        Self {
            plan_value: request.plan_value.clone(),
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Trait for modifying terraform plan behavior of a single attribute
pub trait PlanModifier: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Modify the plan for an attribute
    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse;
}

/// Marks an attribute as requiring replacement when it changes
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this attribute forces replacement of the resource".to_string()
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        let mut response = PlanModifyResponse::unchanged(request);

        if request.state.is_null() || request.plan.is_null() {
            return response;
        }

        response.requires_replace = !matches!(
            (&request.state_value, &request.plan_value),
            (Dynamic::Null, Dynamic::Null) | (Dynamic::Unknown, _) | (_, Dynamic::Unknown)
        ) && !values_equal(&request.state_value, &request.plan_value);

        response
    }
}

/// A plan modifier that uses the current state value when the planned value is unknown
///
/// This is particularly useful for computed attributes that should retain their value
/// during planning when Terraform doesn't know what the new value will be.
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "once set, the value of this attribute in state will not change".to_string()
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        let mut response = PlanModifyResponse::unchanged(request);

        if request.plan_value.is_unknown() && !request.state_value.is_null() {
            response.plan_value = request.state_value.clone();
        }

        response
    }
}

/// Structural equality of two Dynamic values; unknown never equals anything
pub fn values_equal(a: &Dynamic, b: &Dynamic) -> bool {
    match (a, b) {
        (Dynamic::Null, Dynamic::Null) => true,
        (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
        (Dynamic::Number(a), Dynamic::Number(b)) => (a - b).abs() < f64::EPSILON,
        (Dynamic::String(a), Dynamic::String(b)) => a == b,
        (Dynamic::List(a), Dynamic::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Dynamic::Map(a), Dynamic::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifyRequest {
        let path = AttributePath::new("field");
        let mut state_dv = DynamicValue::object();
        state_dv.set_value(&path, state).unwrap();
        let mut plan_dv = DynamicValue::object();
        plan_dv.set_value(&path, plan.clone()).unwrap();
        let mut config_dv = DynamicValue::object();
        config_dv.set_value(&path, plan).unwrap();

        PlanModifyRequest::new(path, config_dv, state_dv, plan_dv)
    }

    #[test]
    fn requires_replace_does_not_trigger_on_same_value() {
        let response =
            RequiresReplace.modify_plan(&request("hello".into(), "hello".into()));

        assert!(!response.requires_replace);
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn requires_replace_triggers_on_different_value() {
        let response =
            RequiresReplace.modify_plan(&request("hello".into(), "world".into()));

        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_ignores_null_to_null() {
        let response = RequiresReplace.modify_plan(&request(Dynamic::Null, Dynamic::Null));

        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_ignores_unknown_values() {
        let response =
            RequiresReplace.modify_plan(&request(Dynamic::Unknown, "value".into()));
        assert!(!response.requires_replace);

        let response =
            RequiresReplace.modify_plan(&request("value".into(), Dynamic::Unknown));
        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_ignores_resource_creation() {
        let path = AttributePath::new("field");
        let mut plan = DynamicValue::object();
        plan.set_string(&path, "value".to_string()).unwrap();

        let request = PlanModifyRequest::new(path, plan.clone(), DynamicValue::null(), plan);
        assert!(!RequiresReplace.modify_plan(&request).requires_replace);
    }

    #[test]
    fn values_equal_handles_all_types() {
        assert!(values_equal(&Dynamic::Number(42.0), &Dynamic::Number(42.0)));
        assert!(!values_equal(
            &Dynamic::Number(42.0),
            &Dynamic::Number(43.0)
        ));

        assert!(values_equal(&Dynamic::Bool(true), &Dynamic::Bool(true)));
        assert!(!values_equal(&Dynamic::Bool(true), &Dynamic::Bool(false)));

        let list1 = Dynamic::List(vec![Dynamic::String("a".to_string()), Dynamic::Number(1.0)]);
        let list2 = Dynamic::List(vec![Dynamic::String("a".to_string()), Dynamic::Number(1.0)]);
        let list3 = Dynamic::List(vec![Dynamic::String("b".to_string()), Dynamic::Number(1.0)]);
        assert!(values_equal(&list1, &list2));
        assert!(!values_equal(&list1, &list3));

        let map1 = HashMap::from([("key".to_string(), Dynamic::from("value"))]);
        let map2 = HashMap::from([("key".to_string(), Dynamic::from("value"))]);
        let map3 = HashMap::from([("key".to_string(), Dynamic::from("different"))]);

        assert!(values_equal(
            &Dynamic::Map(map1.clone()),
            &Dynamic::Map(map2)
        ));
        assert!(!values_equal(&Dynamic::Map(map1), &Dynamic::Map(map3)));

        assert!(!values_equal(&Dynamic::Unknown, &Dynamic::Unknown));
    }

    #[test]
    fn use_state_for_unknown_preserves_state_when_unknown() {
        let response = UseStateForUnknown
            .modify_plan(&request("existing-value".into(), Dynamic::Unknown));

        assert_eq!(response.plan_value, Dynamic::from("existing-value"));
        assert!(!response.requires_replace);
    }

    #[test]
    fn use_state_for_unknown_uses_plan_when_known() {
        let response = UseStateForUnknown
            .modify_plan(&request("existing-value".into(), "new-value".into()));

        assert_eq!(response.plan_value, Dynamic::from("new-value"));
    }

    #[test]
    fn use_state_for_unknown_stays_unknown_on_create() {
        let response = UseStateForUnknown.modify_plan(&request(Dynamic::Null, Dynamic::Unknown));

        assert!(response.plan_value.is_unknown());
    }
}
