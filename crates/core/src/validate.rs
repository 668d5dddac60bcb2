//! Rule evaluation against a submitted request body.
//!
//! Evaluates a composed rule map (see [`crate::rules::compose_rules`])
//! against a JSON request body plus the uploaded-file map. Wildcard
//! paths (`photos.*.caption`) are expanded against the submitted array
//! before evaluation. Unknown rule tokens pass silently; rules other
//! than `required` skip fields that were not submitted at all.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use validator::ValidateEmail;

use crate::field::UploadedFile;
use crate::rules::{Rule, RuleMap};

// ---------------------------------------------------------------------------
// ValidationErrors
// ---------------------------------------------------------------------------

/// Field-path → ordered failure messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(path.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of failing field paths.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn messages(&self, path: &str) -> &[String] {
        self.errors.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, messages) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{path}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// Evaluate `rules` against `body` and `files`; `files` is keyed by the
/// same dotted paths as the rule map (`cover`, `photos.0.image`).
pub fn validate_request(
    rules: &RuleMap,
    body: &Value,
    files: &HashMap<String, UploadedFile>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (path, rule_list) in rules {
        for concrete in expand_path(path, body) {
            let value = lookup_path(body, &concrete);
            let file = files.get(&concrete);
            for rule in rule_list {
                if let Some(message) = evaluate_rule(rule, &concrete, value, file) {
                    errors.add(concrete.clone(), message);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Expand a `rel.*.child` wildcard path against the submitted array;
/// non-wildcard paths pass through unchanged. An absent or empty array
/// yields no concrete paths.
fn expand_path(path: &str, body: &Value) -> Vec<String> {
    let Some((prefix, suffix)) = path.split_once(".*.") else {
        return vec![path.to_string()];
    };
    let len = lookup_path(body, prefix)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    (0..len).map(|i| format!("{prefix}.{i}.{suffix}")).collect()
}

/// Traverse `body` along a dotted path; numeric segments index arrays.
pub fn lookup_path<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn evaluate_rule(
    rule: &Rule,
    path: &str,
    value: Option<&Value>,
    file: Option<&UploadedFile>,
) -> Option<String> {
    let present = file.is_some() || matches!(value, Some(v) if !v.is_null());
    if rule.name != "required" && !present {
        return None;
    }

    match rule.name.as_str() {
        "required" => evaluate_required(path, value, file, present),
        "min" => evaluate_min(rule, path, value, file),
        "max" => evaluate_max(rule, path, value, file),
        "email" => evaluate_email(path, value),
        "numeric" => evaluate_numeric(path, value),
        "integer" => evaluate_integer(path, value),
        "boolean" => evaluate_boolean(path, value),
        "in" => evaluate_in(rule, path, value),
        "regex" => evaluate_regex(rule, path, value),
        "image" => evaluate_image(path, file),
        "mimes" => evaluate_mimes(rule, path, file),
        _ => None, // Unknown rule tokens pass silently
    }
}

fn evaluate_required(
    path: &str,
    value: Option<&Value>,
    file: Option<&UploadedFile>,
    present: bool,
) -> Option<String> {
    let empty = match value {
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    };
    if !present || (file.is_none() && empty) {
        Some(format!("The {path} field is required"))
    } else {
        None
    }
}

/// The comparable size of a submitted value: file size in KiB, string
/// length in characters, array length, or numeric magnitude.
fn magnitude(value: Option<&Value>, file: Option<&UploadedFile>) -> Option<f64> {
    if let Some(f) = file {
        return Some(f.size_bytes() as f64 / 1024.0);
    }
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    }
}

fn evaluate_min(
    rule: &Rule,
    path: &str,
    value: Option<&Value>,
    file: Option<&UploadedFile>,
) -> Option<String> {
    let limit: f64 = rule.arg(0)?.parse().ok()?;
    let size = magnitude(value, file)?;
    if size < limit {
        Some(format!("The {path} field must be at least {}", rule.arg(0)?))
    } else {
        None
    }
}

fn evaluate_max(
    rule: &Rule,
    path: &str,
    value: Option<&Value>,
    file: Option<&UploadedFile>,
) -> Option<String> {
    let limit: f64 = rule.arg(0)?.parse().ok()?;
    let size = magnitude(value, file)?;
    if size > limit {
        Some(format!(
            "The {path} field must not be greater than {}",
            rule.arg(0)?
        ))
    } else {
        None
    }
}

fn evaluate_email(path: &str, value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?;
    if s.validate_email() {
        None
    } else {
        Some(format!("The {path} field must be a valid email address"))
    }
}

fn evaluate_numeric(path: &str, value: Option<&Value>) -> Option<String> {
    let ok = match value? {
        Value::Number(_) => true,
        Value::String(s) => s.parse::<f64>().is_ok(),
        _ => false,
    };
    if ok {
        None
    } else {
        Some(format!("The {path} field must be a number"))
    }
}

fn evaluate_integer(path: &str, value: Option<&Value>) -> Option<String> {
    let ok = match value? {
        Value::Number(n) => n.as_i64().is_some() || n.as_u64().is_some(),
        Value::String(s) => s.parse::<i64>().is_ok(),
        _ => false,
    };
    if ok {
        None
    } else {
        Some(format!("The {path} field must be an integer"))
    }
}

fn evaluate_boolean(path: &str, value: Option<&Value>) -> Option<String> {
    let ok = match value? {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0) | Some(1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    };
    if ok {
        None
    } else {
        Some(format!("The {path} field must be true or false"))
    }
}

fn evaluate_in(rule: &Rule, path: &str, value: Option<&Value>) -> Option<String> {
    let candidate = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Some(format!("The selected {path} is invalid")),
    };
    if rule.args.iter().any(|a| a == &candidate) {
        None
    } else {
        Some(format!("The selected {path} is invalid"))
    }
}

fn evaluate_regex(rule: &Rule, path: &str, value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?;
    let pattern = rule.arg(0)?;
    match Regex::new(pattern) {
        Ok(re) if re.is_match(s) => None,
        Ok(_) => Some(format!("The {path} field format is invalid")),
        Err(_) => None, // Invalid pattern passes silently
    }
}

fn evaluate_image(path: &str, file: Option<&UploadedFile>) -> Option<String> {
    let file = file?;
    if image::guess_format(&file.bytes).is_ok() {
        None
    } else {
        Some(format!("The {path} field must be an image"))
    }
}

fn evaluate_mimes(rule: &Rule, path: &str, file: Option<&UploadedFile>) -> Option<String> {
    let file = file?;
    let ext = file.extension().unwrap_or("").to_ascii_lowercase();
    if rule.args.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
        None
    } else {
        Some(format!(
            "The {path} field must be a file of type: {}",
            rule.args.join(", ")
        ))
    }
}
