//! Provider-specific plan modifiers
//!
//! These complement the framework's `RequiresReplace` and `UseStateForUnknown`
//! for computed attributes whose planned value depends on sibling attributes.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tfplug::plan_modifier::{values_equal, PlanModifier, PlanModifyRequest, PlanModifyResponse};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

/// Reads a sibling value from the planned resource object; `None` when null or unknown
pub type Accessor<T> = Arc<dyn Fn(&DynamicValue) -> tfplug::Result<Option<T>> + Send + Sync>;

struct SiblingCondition<T> {
    accessor: Accessor<T>,
    value: T,
    describe: String,
}

impl<T: PartialEq + Debug> SiblingCondition<T> {
    fn suppress_when(&self, request: &PlanModifyRequest, equal: bool) -> PlanModifyResponse {
        let mut response = PlanModifyResponse::unchanged(request);
        if request.plan_value.is_null() {
            return response;
        }

        match (self.accessor)(&request.plan) {
            Ok(Some(sibling)) if (sibling == self.value) == equal => {
                response.plan_value = Dynamic::Null;
            }
            Ok(_) => {}
            Err(e) => response.diagnostics.push(
                Diagnostic::error("Failed to evaluate plan modifier", e.to_string())
                    .with_attribute(request.attribute_path.clone()),
            ),
        }

        response
    }
}

fn string_accessor(path: AttributePath) -> Accessor<String> {
    Arc::new(move |plan: &DynamicValue| plan.get_optional_string(&path))
}

fn object_accessor(path: AttributePath) -> Accessor<HashMap<String, Dynamic>> {
    Arc::new(move |plan: &DynamicValue| plan.get_optional_map(&path))
}

/// Plans null for the attribute when a sibling equals a given value
pub struct SuppressIfAttributeEquals<T> {
    condition: SiblingCondition<T>,
}

impl<T> SuppressIfAttributeEquals<T> {
    pub fn new(describe: &str, accessor: Accessor<T>, value: T) -> Self {
        Self {
            condition: SiblingCondition {
                accessor,
                value,
                describe: describe.to_string(),
            },
        }
    }
}

impl SuppressIfAttributeEquals<String> {
    pub fn string(path: AttributePath, value: &str) -> Self {
        Self::new(&path.to_string(), string_accessor(path), value.to_string())
    }
}

impl SuppressIfAttributeEquals<HashMap<String, Dynamic>> {
    pub fn object(path: AttributePath, value: HashMap<String, Dynamic>) -> Self {
        Self::new(&path.to_string(), object_accessor(path), value)
    }
}

impl<T: PartialEq + Debug + Send + Sync> PlanModifier for SuppressIfAttributeEquals<T> {
    fn description(&self) -> String {
        format!(
            "null when {} is {:?}",
            self.condition.describe, self.condition.value
        )
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        self.condition.suppress_when(request, true)
    }
}

/// Plans null for the attribute when a sibling differs from a given value
pub struct SuppressIfAttributeNotEquals<T> {
    condition: SiblingCondition<T>,
}

impl<T> SuppressIfAttributeNotEquals<T> {
    pub fn new(describe: &str, accessor: Accessor<T>, value: T) -> Self {
        Self {
            condition: SiblingCondition {
                accessor,
                value,
                describe: describe.to_string(),
            },
        }
    }
}

impl SuppressIfAttributeNotEquals<String> {
    pub fn string(path: AttributePath, value: &str) -> Self {
        Self::new(&path.to_string(), string_accessor(path), value.to_string())
    }
}

impl SuppressIfAttributeNotEquals<HashMap<String, Dynamic>> {
    pub fn object(path: AttributePath, value: HashMap<String, Dynamic>) -> Self {
        Self::new(&path.to_string(), object_accessor(path), value)
    }
}

impl<T: PartialEq + Debug + Send + Sync> PlanModifier for SuppressIfAttributeNotEquals<T> {
    fn description(&self) -> String {
        format!(
            "null unless {} is {:?}",
            self.condition.describe, self.condition.value
        )
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        self.condition.suppress_when(request, false)
    }
}

/// Keeps the prior state value of a computed attribute while the tracked
/// attributes are planned unchanged
pub struct UseStateIfConfigUnchanged {
    tracked: Vec<AttributePath>,
}

impl UseStateIfConfigUnchanged {
    pub fn new(tracked: Vec<AttributePath>) -> Self {
        Self { tracked }
    }
}

impl PlanModifier for UseStateIfConfigUnchanged {
    fn description(&self) -> String {
        let names: Vec<String> = self.tracked.iter().map(ToString::to_string).collect();
        format!("keeps the prior value unless {} change", names.join(", "))
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        let mut response = PlanModifyResponse::unchanged(request);

        if !request.plan_value.is_unknown()
            || request.state.is_null()
            || request.state_value.is_null()
        {
            return response;
        }

        for path in &self.tracked {
            let compared = request
                .state
                .get(path)
                .and_then(|prior| request.plan.get(path).map(|planned| (prior, planned)));

            match compared {
                Ok((prior, planned)) if values_equal(&prior, &planned) => {}
                Ok(_) => return response,
                Err(e) => {
                    response.diagnostics.push(
                        Diagnostic::error("Failed to evaluate plan modifier", e.to_string())
                            .with_attribute(request.attribute_path.clone()),
                    );
                    return response;
                }
            }
        }

        response.plan_value = request.state_value.clone();
        response
    }
}

/// Plans null instead of unknown, for computed values the API often omits
pub struct UnknownToNull;

impl PlanModifier for UnknownToNull {
    fn description(&self) -> String {
        "null when not known at plan time".to_string()
    }

    fn modify_plan(&self, request: &PlanModifyRequest) -> PlanModifyResponse {
        let mut response = PlanModifyResponse::unchanged(request);
        if request.plan_value.is_unknown() {
            response.plan_value = Dynamic::Null;
        }
        response
    }
}
