use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::errors::ServiceError;

/// What went wrong with a field, independent of how it is worded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Missing, or an empty value where one is required.
    Required,
    /// Below a numeric or length minimum.
    Min { limit: String },
    /// Not a valid email address.
    Email,
    /// Any other validator code.
    Other { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

/// Flattens validator output into typed violations. Nested structs and
/// lists contribute dotted / indexed field paths (`items[1].sku`).
pub fn collect_violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    collect_into(errors, "", &mut out);
    out
}

fn collect_into(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            (*field).to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    out.push(FieldViolation {
                        field: path.clone(),
                        kind: classify(&err.code, &err.params),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_into(nested, &path, out);
            }
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    collect_into(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn classify(
    code: &str,
    params: &std::collections::HashMap<std::borrow::Cow<'static, str>, serde_json::Value>,
) -> ViolationKind {
    let min = params.get("min").map(render_param);
    match code {
        "required" => ViolationKind::Required,
        // A length floor of one is just "this must not be empty".
        "length" | "range" => match min {
            Some(limit) if limit == "1" && code == "length" => ViolationKind::Required,
            Some(limit) => ViolationKind::Min { limit },
            None => ViolationKind::Other {
                code: code.to_string(),
            },
        },
        "email" => ViolationKind::Email,
        other => ViolationKind::Other {
            code: other.to_string(),
        },
    }
}

fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        // validator stores numeric limits as floats; "2.0" reads badly in
        // a message, so render whole numbers without the fraction.
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Pure rendering of a violation into the message the API returns.
pub fn render_violation(violation: &FieldViolation) -> String {
    match &violation.kind {
        ViolationKind::Required => format!("{} is a required field", violation.field),
        ViolationKind::Min { limit } => format!(
            "{} should at least be greater than {}",
            violation.field, limit
        ),
        ViolationKind::Email => format!("{} provided is invalid", violation.field),
        ViolationKind::Other { .. } => format!("{} is not valid", violation.field),
    }
}

/// Runs derive-based validation and converts failures into a 400 with
/// one rendered message per violation.
pub fn validate_request<T: Validate>(request: &T) -> Result<(), ServiceError> {
    request.validate().map_err(|errors| {
        let messages = collect_violations(&errors)
            .iter()
            .map(render_violation)
            .collect();
        ServiceError::ValidationFailed(messages)
    })
}
