//! The incoming-request contract and its in-crate implementation.

use std::collections::HashMap;

use formbind_core::validate::{lookup_path, validate_request};
use formbind_core::{RuleMap, UploadedFile, ValidationErrors};
use serde_json::Value;

/// What the submission pipeline needs from an incoming request: dotted-
/// path value lookup, uploaded-file lookup under the same paths, and
/// validation against a composed rule map.
pub trait Request: Send + Sync {
    fn get(&self, path: &str) -> Option<Value>;

    fn file(&self, path: &str) -> Option<&UploadedFile>;

    fn validate(&self, rules: &RuleMap) -> Result<(), ValidationErrors>;
}

/// A request backed by a JSON body plus a flat uploaded-file map.
///
/// Files are keyed by the same dotted paths the rule map uses
/// (`cover`, `photos.0.image`).
#[derive(Debug, Default)]
pub struct FormRequest {
    body: Value,
    files: HashMap<String, UploadedFile>,
}

impl FormRequest {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(path.into(), file);
        self
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl Request for FormRequest {
    fn get(&self, path: &str) -> Option<Value> {
        lookup_path(&self.body, path).cloned()
    }

    fn file(&self, path: &str) -> Option<&UploadedFile> {
        self.files.get(path)
    }

    fn validate(&self, rules: &RuleMap) -> Result<(), ValidationErrors> {
        validate_request(rules, &self.body, &self.files)
    }
}
