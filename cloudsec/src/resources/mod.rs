pub mod appsec_integration;
pub mod asset_group;
pub mod aws_account;
pub mod cwp_policy;

pub use appsec_integration::AppSecIntegrationResource;
pub use asset_group::AssetGroupResource;
pub use aws_account::AwsAccountResource;
pub use cwp_policy::CwpPolicyResource;

use crate::api::ApiError;
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub(crate) fn api_diagnostic(summary: &str, error: &ApiError) -> Diagnostic {
    Diagnostic::error(summary, format!("API error: {}", error))
}

pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "The provider must be configured before resources can be managed",
    )
}

/// Required string from configuration or plan, as an attribute-scoped diagnostic on failure
pub(crate) fn required_string(value: &DynamicValue, name: &str) -> Result<String, Diagnostic> {
    let path = AttributePath::new(name);
    value.get_string(&path).map_err(|e| {
        Diagnostic::error(format!("Missing {}", name), e.to_string()).with_attribute(path)
    })
}

pub(crate) fn optional_string(
    value: &DynamicValue,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    let path = AttributePath::new(name);
    value.get_optional_string(&path).unwrap_or_else(|e| {
        diagnostics.push(Diagnostic::error("Invalid attribute", e.to_string()).with_attribute(path));
        None
    })
}

/// Strings of a list attribute; null and unknown elements are skipped
pub(crate) fn string_list(
    value: &DynamicValue,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Vec<String>> {
    let path = AttributePath::new(name);
    match value.get_optional_list(&path) {
        Ok(items) => items.map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        }),
        Err(e) => {
            diagnostics.push(Diagnostic::error("Invalid attribute", e.to_string()).with_attribute(path));
            None
        }
    }
}

pub(crate) fn optional_to_dynamic(value: Option<&str>) -> Dynamic {
    value.map_or(Dynamic::Null, Dynamic::from)
}

pub(crate) fn strings_to_dynamic(values: &[String]) -> Dynamic {
    Dynamic::List(values.iter().map(|v| Dynamic::from(v.as_str())).collect())
}
