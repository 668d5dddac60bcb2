//! Field descriptors — the canonical, validated representation of form
//! fields.
//!
//! A raw field definition ([`RawField`]) is what callers declare; schema
//! resolution (see [`crate::schema`]) turns it into a [`FieldKind`]: either
//! a scalar [`FieldDescriptor`] or a [`RelationFieldDescriptor`] binding a
//! nested child form. Descriptors are immutable once resolution completes
//! and live for the lifetime of the form object.
//!
//! All caller-supplied behaviour (value resolvers, filename resolvers,
//! post-process hooks) is carried as explicit strategy functions that
//! receive a [`SubmissionContext`] snapshot — never closures bound to
//! hidden form state.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::{Rule, RuleSet};
use crate::types::{DbId, FormMode, Record};

// ---------------------------------------------------------------------------
// InputKind
// ---------------------------------------------------------------------------

/// The input control a field renders as.
///
/// `File` and `Image` are upload-capable: fields of those kinds must
/// carry complete upload metadata or schema resolution fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Text,
    Textarea,
    Number,
    Date,
    Email,
    Radio,
    Checkbox,
    Select,
    SelectMultiple,
    File,
    Image,
}

impl InputKind {
    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Date => "date",
            Self::Email => "email",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::Select => "select",
            Self::SelectMultiple => "select-multiple",
            Self::File => "file",
            Self::Image => "image",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, crate::CoreError> {
        match s {
            "text" => Ok(Self::Text),
            "textarea" => Ok(Self::Textarea),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "email" => Ok(Self::Email),
            "radio" => Ok(Self::Radio),
            "checkbox" => Ok(Self::Checkbox),
            "select" => Ok(Self::Select),
            "select-multiple" => Ok(Self::SelectMultiple),
            "file" => Ok(Self::File),
            "image" => Ok(Self::Image),
            _ => Err(crate::CoreError::Schema(format!(
                "Unknown input kind '{s}'"
            ))),
        }
    }

    /// Whether fields of this kind accept a binary attachment.
    pub fn is_uploadable(&self) -> bool {
        matches!(self, Self::File | Self::Image)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UploadedFile
// ---------------------------------------------------------------------------

/// An incoming binary attachment, as extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The extension of the original filename, without the dot.
    pub fn extension(&self) -> Option<&str> {
        match self.original_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

// ---------------------------------------------------------------------------
// SubmissionContext and strategy function types
// ---------------------------------------------------------------------------

/// Immutable snapshot of the active submission, handed to every
/// caller-supplied strategy function.
///
/// `entity_id` is `None` until the root entity has been persisted, so
/// resolvers running before the save step observe `None` in create mode.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub mode: FormMode,
    pub entity: String,
    pub entity_id: Option<DbId>,
}

/// Maps a raw request value to the value written into the entity.
pub type SubmitValueResolver = Arc<dyn Fn(Value, &SubmissionContext) -> Value + Send + Sync>;

/// Maps a persisted value to the value handed to a renderer.
pub type RenderValueResolver = Arc<dyn Fn(Value, &SubmissionContext) -> Value + Send + Sync>;

/// Produces the stored filename for an attachment. Receives the file,
/// the field name, and — for nested child rows — the row index, so
/// per-row names can be disambiguated.
pub type FilenameResolver =
    Arc<dyn Fn(&UploadedFile, &str, Option<usize>) -> String + Send + Sync>;

/// Post-processing hook run after an attachment is written, with the
/// stored path and the disk name. Failures abort the submission.
pub type ProcessFileHook =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The default filename resolver: a collision-resistant random name
/// preserving the original extension.
pub fn default_upload_filename() -> FilenameResolver {
    Arc::new(|file, _field, _row| match file.extension() {
        Some(ext) => format!("{}.{ext}", uuid::Uuid::new_v4()),
        None => uuid::Uuid::new_v4().to_string(),
    })
}

// ---------------------------------------------------------------------------
// UploadSpec
// ---------------------------------------------------------------------------

/// Complete upload metadata for an upload-capable field.
#[derive(Clone)]
pub struct UploadSpec {
    /// Name of the blob store the attachment is written to.
    pub disk: String,
    /// Directory prefix within the store; leading/trailing slashes are
    /// trimmed when paths are composed.
    pub path: String,
    pub filename: FilenameResolver,
    /// Delete the previously stored attachment before writing a new one.
    pub delete_old_file: bool,
    pub process_file: Option<ProcessFileHook>,
}

impl fmt::Debug for UploadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSpec")
            .field("disk", &self.disk)
            .field("path", &self.path)
            .field("delete_old_file", &self.delete_old_file)
            .field("process_file", &self.process_file.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// Canonical description of one scalar field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: Option<String>,
    pub input: InputKind,
    /// Whether the field participates in persistence.
    pub exists: bool,
    pub disabled: bool,
    /// Ordered validation rule tokens for the active mode.
    pub rules: Vec<Rule>,
    /// Derived: true when `rules` contains `required`.
    pub required: bool,
    pub default_value: Option<Value>,
    pub upload: Option<UploadSpec>,
    pub submit_value: Option<SubmitValueResolver>,
    pub render_value: Option<RenderValueResolver>,
}

impl FieldDescriptor {
    /// Whether this field accepts a binary attachment. Schema resolution
    /// guarantees `upload` is populated whenever this returns true.
    pub fn is_uploadable(&self) -> bool {
        self.input.is_uploadable()
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("exists", &self.exists)
            .field("disabled", &self.disabled)
            .field("rules", &self.rules)
            .field("required", &self.required)
            .field("upload", &self.upload)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Whether a relation binds a collection of child rows or a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ToMany,
    ToOne,
}

/// A relation as exposed by the entity store's schema: the kind, the
/// related entity type, and the foreign-key column on the child side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub related: String,
    pub foreign_key: String,
}

/// A field that binds a nested child form to a relation instead of a
/// scalar column.
///
/// `existing_rows` is a snapshot of the current child rows, materialized
/// at form construction time for to-many relations on an existing
/// parent; it is what renderers iterate and stays untouched by
/// submissions.
#[derive(Clone)]
pub struct RelationFieldDescriptor {
    pub name: String,
    pub label: Option<String>,
    pub exists: bool,
    pub relation: RelationDef,
    pub fields: IndexMap<String, FieldDescriptor>,
    pub existing_rows: Vec<Record>,
}

impl RelationFieldDescriptor {
    /// Child fields that accept binary attachments.
    pub fn uploadable_fields(&self) -> impl Iterator<Item = (&String, &FieldDescriptor)> {
        self.fields.iter().filter(|(_, f)| f.is_uploadable())
    }
}

impl fmt::Debug for RelationFieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationFieldDescriptor")
            .field("name", &self.name)
            .field("exists", &self.exists)
            .field("relation", &self.relation)
            .field("fields", &self.fields)
            .field("existing_rows", &self.existing_rows.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// A resolved field: scalar or relation. The two variants are decided
/// exhaustively at schema-resolution time, never re-inspected ad hoc.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(FieldDescriptor),
    Relation(RelationFieldDescriptor),
}

impl FieldKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(f) => &f.name,
            Self::Relation(r) => &r.name,
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Scalar(f) => f.exists,
            Self::Relation(r) => r.exists,
        }
    }

    pub fn as_scalar(&self) -> Option<&FieldDescriptor> {
        match self {
            Self::Scalar(f) => Some(f),
            Self::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationFieldDescriptor> {
        match self {
            Self::Relation(r) => Some(r),
            Self::Scalar(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RawField
// ---------------------------------------------------------------------------

/// A field declaration as written by the caller, before schema
/// resolution validates and normalizes it.
#[derive(Clone, Default)]
pub struct RawField {
    pub input: Option<InputKind>,
    pub label: Option<String>,
    pub exists: Option<bool>,
    pub disabled: Option<bool>,
    pub rules: Option<RuleSet>,
    pub rules_create: Option<RuleSet>,
    pub rules_update: Option<RuleSet>,
    pub default_value: Option<Value>,
    pub upload_disk: Option<String>,
    pub upload_path: Option<String>,
    pub upload_filename: Option<FilenameResolver>,
    pub delete_old_file: bool,
    pub process_file: Option<ProcessFileHook>,
    pub submit_value: Option<SubmitValueResolver>,
    pub render_value: Option<RenderValueResolver>,
    /// Attribute overrides applied only in create mode.
    pub if_create: Option<Box<RawField>>,
    /// Attribute overrides applied only in update mode.
    pub if_update: Option<Box<RawField>>,
    /// Child field declarations; present on relation fields only.
    pub fields: Option<IndexMap<String, RawField>>,
}

impl RawField {
    pub fn new(input: InputKind) -> Self {
        Self {
            input: Some(input),
            ..Self::default()
        }
    }

    /// A relation declaration: a label plus the child field map.
    pub fn relation(label: impl Into<String>, fields: IndexMap<String, RawField>) -> Self {
        Self {
            label: Some(label.into()),
            fields: Some(fields),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    /// Rules for both modes; `"a|b|c"` strings and token lists are accepted.
    pub fn rules(mut self, rules: impl Into<RuleSet>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    /// Rules applied in create mode, overriding [`RawField::rules`].
    pub fn rules_create(mut self, rules: impl Into<RuleSet>) -> Self {
        self.rules_create = Some(rules.into());
        self
    }

    /// Rules applied in update mode, overriding [`RawField::rules`].
    pub fn rules_update(mut self, rules: impl Into<RuleSet>) -> Self {
        self.rules_update = Some(rules.into());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Target store and directory prefix for an upload-capable field.
    pub fn upload(mut self, disk: impl Into<String>, path: impl Into<String>) -> Self {
        self.upload_disk = Some(disk.into());
        self.upload_path = Some(path.into());
        self
    }

    pub fn upload_filename(mut self, resolver: FilenameResolver) -> Self {
        self.upload_filename = Some(resolver);
        self
    }

    pub fn delete_old_file(mut self) -> Self {
        self.delete_old_file = true;
        self
    }

    pub fn process_file(mut self, hook: ProcessFileHook) -> Self {
        self.process_file = Some(hook);
        self
    }

    pub fn resolve_submit_value(mut self, resolver: SubmitValueResolver) -> Self {
        self.submit_value = Some(resolver);
        self
    }

    pub fn resolve_render_value(mut self, resolver: RenderValueResolver) -> Self {
        self.render_value = Some(resolver);
        self
    }

    pub fn if_create(mut self, overrides: RawField) -> Self {
        self.if_create = Some(Box::new(overrides));
        self
    }

    pub fn if_update(mut self, overrides: RawField) -> Self {
        self.if_update = Some(Box::new(overrides));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- InputKind ----------------------------------------------------------

    #[test]
    fn input_kind_roundtrip() {
        let pairs = [
            ("text", InputKind::Text),
            ("textarea", InputKind::Textarea),
            ("number", InputKind::Number),
            ("date", InputKind::Date),
            ("email", InputKind::Email),
            ("radio", InputKind::Radio),
            ("checkbox", InputKind::Checkbox),
            ("select", InputKind::Select),
            ("select-multiple", InputKind::SelectMultiple),
            ("file", InputKind::File),
            ("image", InputKind::Image),
        ];
        for (s, kind) in pairs {
            assert_eq!(InputKind::from_str(s).unwrap(), kind);
            assert_eq!(kind.as_str(), s);
        }
    }

    #[test]
    fn input_kind_invalid_rejects() {
        assert!(InputKind::from_str("slider").is_err());
    }

    #[test]
    fn only_file_and_image_are_uploadable() {
        assert!(InputKind::File.is_uploadable());
        assert!(InputKind::Image.is_uploadable());
        assert!(!InputKind::Text.is_uploadable());
        assert!(!InputKind::Select.is_uploadable());
    }

    // -- UploadedFile -------------------------------------------------------

    #[test]
    fn extension_from_original_name() {
        let file = UploadedFile::new("photo.final.JPG", vec![1]);
        assert_eq!(file.extension(), Some("JPG"));
    }

    #[test]
    fn no_extension_cases() {
        assert_eq!(UploadedFile::new("README", vec![]).extension(), None);
        assert_eq!(UploadedFile::new(".gitignore", vec![]).extension(), None);
        assert_eq!(UploadedFile::new("trailing.", vec![]).extension(), None);
    }

    // -- default filename resolver ------------------------------------------

    #[test]
    fn default_filename_preserves_extension() {
        let resolver = default_upload_filename();
        let file = UploadedFile::new("avatar.png", vec![1, 2, 3]);
        let name = resolver(&file, "avatar", None);
        assert!(name.ends_with(".png"));
        assert!(name.len() > ".png".len() + 30);
    }

    #[test]
    fn default_filename_unique_per_call() {
        let resolver = default_upload_filename();
        let file = UploadedFile::new("avatar.png", vec![]);
        let a = resolver(&file, "avatar", None);
        let b = resolver(&file, "avatar", None);
        assert_ne!(a, b);
    }

    #[test]
    fn default_filename_without_extension() {
        let resolver = default_upload_filename();
        let file = UploadedFile::new("blob", vec![]);
        let name = resolver(&file, "blob", Some(3));
        assert!(!name.contains('.'));
    }
}
