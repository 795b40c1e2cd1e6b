//! Attribute validators, run during Validate*Config
//!
//! Validators only see known, non-null values; null and unknown values are
//! skipped before a validator is called.

use crate::types::{AttributePath, Diagnostic, Dynamic};

pub trait Validator: Send + Sync {
    fn description(&self) -> String;
    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>);
}

fn invalid(path: &AttributePath, summary: String, detail: String) -> Diagnostic {
    Diagnostic::error(summary, detail).with_attribute(path.clone())
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        format!(
            "string length must be between {} and {}",
            self.min.unwrap_or(0),
            self.max.map_or("unbounded".to_string(), |m| m.to_string())
        )
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else { return };
        let len = s.chars().count();

        if let Some(min) = self.min {
            if len < min {
                diagnostics.push(invalid(
                    path,
                    format!("{} must have minimum length of {}", path, min),
                    format!("Got length {}", len),
                ));
            }
        }
        if let Some(max) = self.max {
            if len > max {
                diagnostics.push(invalid(
                    path,
                    format!("{} must have maximum length of {}", path, max),
                    format!("Got length {}", len),
                ));
            }
        }
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        format!("value must match {}", self.description)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(s) = value.as_str() {
            if !self.pattern.is_match(s) {
                diagnostics.push(invalid(
                    path,
                    format!("{} must match {}", path, self.description),
                    format!("Value '{}' does not match pattern", s),
                ));
            }
        }
    }
}

/// Restricts a string to a fixed set of values
pub struct StringOneOfValidator {
    pub values: Vec<String>,
}

impl StringOneOfValidator {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringOneOfValidator {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.values.join(", "))
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(s) = value.as_str() {
            if !self.values.iter().any(|v| v == s) {
                diagnostics.push(invalid(
                    path,
                    format!("Invalid value for {}", path),
                    format!(
                        "Value '{}' must be one of: {}",
                        s,
                        self.values
                            .iter()
                            .map(|v| format!("\"{}\"", v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                ));
            }
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("value must be between {} and {}", min, max),
            (Some(min), None) => format!("value must be at least {}", min),
            (None, Some(max)) => format!("value must be at most {}", max),
            (None, None) => "any number".to_string(),
        }
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(n) = value.as_number() else { return };

        if let Some(min) = self.min {
            if n < min {
                diagnostics.push(invalid(
                    path,
                    format!("{} must be at least {}", path, min),
                    format!("Got {}", n),
                ));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                diagnostics.push(invalid(
                    path,
                    format!("{} must be at most {}", path, max),
                    format!("Got {}", n),
                ));
            }
        }
    }
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        format!(
            "list must have between {} and {} items",
            self.min.unwrap_or(0),
            self.max.map_or("unbounded".to_string(), |m| m.to_string())
        )
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(items) = value.as_list() else { return };

        if let Some(min) = self.min {
            if items.len() < min {
                diagnostics.push(invalid(
                    path,
                    format!("{} must have at least {} items", path, min),
                    format!("Got {} items", items.len()),
                ));
            }
        }
        if let Some(max) = self.max {
            if items.len() > max {
                diagnostics.push(invalid(
                    path,
                    format!("{} must have at most {} items", path, max),
                    format!("Got {} items", items.len()),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(validator: &dyn Validator, value: Dynamic) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        validator.validate(&value, &AttributePath::new("test_field"), &mut diags);
        diags
    }

    #[test]
    fn string_length_validator_accepts_valid_length() {
        let validator = StringLengthValidator {
            min: Some(3),
            max: Some(10),
        };

        assert!(run(&validator, "hello".into()).is_empty());
    }

    #[test]
    fn string_length_validator_rejects_too_short() {
        let validator = StringLengthValidator {
            min: Some(5),
            max: None,
        };

        let diags = run(&validator, "hi".into());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("minimum length"));
        assert_eq!(diags[0].attribute, Some(AttributePath::new("test_field")));
    }

    #[test]
    fn string_pattern_validator_rejects_non_matching() {
        let validator = StringPatternValidator {
            pattern: regex::Regex::new(r"^\d{12}$").unwrap(),
            description: "a 12-digit account id".to_string(),
        };

        assert!(run(&validator, "123456789012".into()).is_empty());

        let diags = run(&validator, "invalid".into());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("12-digit account id"));
    }

    #[test]
    fn string_one_of_validator_lists_allowed_values() {
        let validator = StringOneOfValidator::new(["api-key", "bearer"]);

        assert!(run(&validator, "bearer".into()).is_empty());

        let diags = run(&validator, "basic".into());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].detail.contains("\"api-key\", \"bearer\""));
    }

    #[test]
    fn number_range_validator_rejects_too_small() {
        let validator = NumberRangeValidator {
            min: Some(10.0),
            max: None,
        };

        assert!(run(&validator, Dynamic::Number(50.0)).is_empty());

        let diags = run(&validator, Dynamic::Number(5.0));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("at least"));
    }

    #[test]
    fn list_length_validator_rejects_empty_list() {
        let validator = ListLengthValidator {
            min: Some(1),
            max: None,
        };

        assert!(run(&validator, Dynamic::List(vec!["a".into()])).is_empty());
        assert_eq!(run(&validator, Dynamic::List(vec![])).len(), 1);
    }

    #[test]
    fn validators_ignore_other_types() {
        let validator = StringLengthValidator {
            min: Some(5),
            max: None,
        };

        assert!(run(&validator, Dynamic::Number(1.0)).is_empty());
    }
}
