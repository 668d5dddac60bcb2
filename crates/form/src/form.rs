//! The form object: builder, resolved schema, and render surface.
//!
//! A [`Form`] is constructed once per entity (create) or per entity row
//! (update) through [`FormBuilder`]. Schema resolution and every
//! registration check happen before the form is usable; by the time
//! `build` returns, the descriptors are immutable and submit-time code
//! only sees well-formed state. The submission pipeline itself lives in
//! `submit.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use formbind_core::schema::resolve_fields;
use formbind_core::{
    CoreError, FieldKind, FilenameResolver, FormMode, InputKind, ProcessFileHook, RawField, Record,
    RelationKind, RenderValueResolver, Rule, RuleMap, SubmissionContext, SubmitValueResolver,
    ValueMap,
};
use formbind_core::rules::compose_rules;
use formbind_core::{RelationInspector, Schema};
use formbind_store::{DiskRegistry, EntityStore};
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::FormConfig;
use crate::error::FormError;

/// Mutates the root entity just before it is persisted.
pub type BeforeSaveHook = Arc<dyn Fn(&mut Record, &SubmissionContext) + Send + Sync>;

/// Mutates one child row just before it is persisted.
pub type BeforeSaveRelationHook = Arc<dyn Fn(&mut Record, &SubmissionContext) + Send + Sync>;

/// Transforms the merged view-data map handed to renderers.
pub type FormDataResolver = Arc<dyn Fn(ValueMap) -> ValueMap + Send + Sync>;

// ---------------------------------------------------------------------------
// FormBuilder
// ---------------------------------------------------------------------------

/// Configures and validates a form before first use.
///
/// Registration methods that reference a field or relation fail fast:
/// an unknown relation key is a [`FormError::RelationContract`], an
/// unknown field path a schema error. `build` resolves the schema and
/// materializes relation snapshots through the entity store.
pub struct FormBuilder {
    entity: String,
    record: Record,
    mode: FormMode,
    store: Arc<dyn EntityStore>,
    disks: Arc<DiskRegistry>,
    config: Arc<FormConfig>,
    fields: IndexMap<String, RawField>,
    rules_create: RuleMap,
    rules_update: RuleMap,
    before_save: Option<BeforeSaveHook>,
    before_save_relation: HashMap<String, BeforeSaveRelationHook>,
    form_data: Option<FormDataResolver>,
    view: Option<String>,
    input_views: HashMap<InputKind, String>,
    view_data: ValueMap,
    action: String,
    styles: Vec<String>,
    scripts: Vec<String>,
    old_input: Option<ValueMap>,
}

impl std::fmt::Debug for FormBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormBuilder").finish_non_exhaustive()
    }
}

impl FormBuilder {
    /// Start a form for `record` of type `entity`. A record without an
    /// id produces a create-mode form; one with an id, update mode.
    pub fn new(
        entity: impl Into<String>,
        record: Record,
        store: Arc<dyn EntityStore>,
        disks: Arc<DiskRegistry>,
        config: Arc<FormConfig>,
    ) -> Self {
        let mode = if record.exists() {
            FormMode::Update
        } else {
            FormMode::Create
        };
        Self {
            entity: entity.into(),
            record,
            mode,
            store,
            disks,
            config,
            fields: IndexMap::new(),
            rules_create: RuleMap::new(),
            rules_update: RuleMap::new(),
            before_save: None,
            before_save_relation: HashMap::new(),
            form_data: None,
            view: None,
            input_views: HashMap::new(),
            view_data: ValueMap::new(),
            action: String::new(),
            styles: Vec::new(),
            scripts: Vec::new(),
            old_input: None,
        }
    }

    /// Declare the field map, in render and sync order.
    pub fn fields(mut self, fields: IndexMap<String, RawField>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn field(mut self, key: impl Into<String>, field: RawField) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    /// Caller-side base rule maps, one per mode. Composition merges
    /// per-field rules into these; the two sets are never mixed.
    pub fn rules(mut self, create: RuleMap, update: RuleMap) -> Self {
        self.rules_create = create;
        self.rules_update = update;
        self
    }

    /// Declare a to-many relation field. The entity store must expose a
    /// to-many relation under `key`.
    pub fn with_many(
        self,
        key: impl Into<String>,
        label: impl Into<String>,
        fields: IndexMap<String, RawField>,
    ) -> Result<Self, FormError> {
        self.with_relation(key.into(), label.into(), fields, RelationKind::ToMany)
    }

    /// Declare a to-one relation field. The entity store must expose a
    /// to-one relation under `key`.
    pub fn with_one(
        self,
        key: impl Into<String>,
        label: impl Into<String>,
        fields: IndexMap<String, RawField>,
    ) -> Result<Self, FormError> {
        self.with_relation(key.into(), label.into(), fields, RelationKind::ToOne)
    }

    fn with_relation(
        mut self,
        key: String,
        label: String,
        fields: IndexMap<String, RawField>,
        expected: RelationKind,
    ) -> Result<Self, FormError> {
        let def = self
            .store
            .relation_of(&self.entity, &key)
            .ok_or_else(|| FormError::RelationContract(key.clone()))?;
        if def.kind != expected {
            return Err(CoreError::Schema(format!(
                "Relation '{key}' on entity '{}' is not {expected:?}",
                self.entity
            ))
            .into());
        }
        self.fields.insert(key, RawField::relation(label, fields));
        Ok(self)
    }

    /// Mutate the root entity right before it is saved.
    pub fn before_save(mut self, hook: BeforeSaveHook) -> Self {
        self.before_save = Some(hook);
        self
    }

    /// Mutate each child row of `key` right before it is saved. Fails
    /// fast when `key` is not a declared relation.
    pub fn before_save_relation(
        mut self,
        key: impl Into<String>,
        hook: BeforeSaveRelationHook,
    ) -> Result<Self, FormError> {
        let key = key.into();
        let declared = self
            .fields
            .get(&key)
            .is_some_and(|field| field.fields.is_some())
            && self.store.relation_of(&self.entity, &key).is_some();
        if !declared {
            return Err(FormError::RelationContract(key));
        }
        self.before_save_relation.insert(key, hook);
        Ok(self)
    }

    /// Attach a submit-value resolver to `path` (`field` or
    /// `relation.child`).
    pub fn resolve_submit_value(
        mut self,
        path: &str,
        resolver: SubmitValueResolver,
    ) -> Result<Self, FormError> {
        self.raw_field_mut(path)?.submit_value = Some(resolver);
        Ok(self)
    }

    /// Attach a render-value resolver to `path`.
    pub fn resolve_render_value(
        mut self,
        path: &str,
        resolver: RenderValueResolver,
    ) -> Result<Self, FormError> {
        self.raw_field_mut(path)?.render_value = Some(resolver);
        Ok(self)
    }

    /// Override the stored-filename resolver of an upload field.
    pub fn upload_filename(
        mut self,
        path: &str,
        resolver: FilenameResolver,
    ) -> Result<Self, FormError> {
        self.raw_field_mut(path)?.upload_filename = Some(resolver);
        Ok(self)
    }

    /// Register a post-process hook on an upload field.
    pub fn process_file(mut self, path: &str, hook: ProcessFileHook) -> Result<Self, FormError> {
        self.raw_field_mut(path)?.process_file = Some(hook);
        Ok(self)
    }

    fn raw_field_mut(&mut self, path: &str) -> Result<&mut RawField, FormError> {
        let missing = || CoreError::Schema(format!("Form has no field '{path}'")).into();
        match path.split_once('.') {
            Some((rel, child)) => self
                .fields
                .get_mut(rel)
                .and_then(|field| field.fields.as_mut())
                .and_then(|children| children.get_mut(child))
                .ok_or_else(missing),
            None => self.fields.get_mut(path).ok_or_else(missing),
        }
    }

    /// Transform the merged view-data map before it reaches a renderer.
    pub fn resolve_form_data(mut self, resolver: FormDataResolver) -> Self {
        self.form_data = Some(resolver);
        self
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_input_view(mut self, kind: InputKind, view: impl Into<String>) -> Self {
        self.input_views.insert(kind, view.into());
        self
    }

    pub fn with_view_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.view_data.insert(key.into(), value);
        self
    }

    pub fn with_action(mut self, url: impl Into<String>) -> Self {
        self.action = url.into();
        self
    }

    pub fn with_css(mut self, href: impl Into<String>) -> Self {
        self.styles.push(href.into());
        self
    }

    pub fn with_js(mut self, src: impl Into<String>) -> Self {
        self.scripts.push(src.into());
        self
    }

    /// Session old-input values that take precedence when rendering.
    pub fn with_old_input(mut self, old_input: ValueMap) -> Self {
        self.old_input = Some(old_input);
        self
    }

    /// Resolve the schema and materialize relation snapshots.
    pub async fn build(self) -> Result<Form, FormError> {
        let mut schema = resolve_fields(
            &self.entity,
            self.fields.clone(),
            self.mode,
            self.store.as_ref() as &dyn RelationInspector,
        )?;

        // Explicitly declared relations must have resolved as such;
        // a field that fell back to scalar means the accessor vanished
        // between registration and build.
        for key in self.before_save_relation.keys() {
            if !matches!(schema.get(key), Some(FieldKind::Relation(_))) {
                return Err(FormError::RelationContract(key.clone()));
            }
        }

        // Snapshot current child rows for to-many relations on an
        // existing parent; renderers iterate these.
        if self.mode.is_update() {
            if let Some(parent_id) = self.record.id {
                for field in schema.values_mut() {
                    let FieldKind::Relation(rel) = field else {
                        continue;
                    };
                    if rel.relation.kind == RelationKind::ToMany {
                        rel.existing_rows =
                            self.store.children(&rel.relation, parent_id).await?;
                    }
                }
            }
        }

        let view = self.view.unwrap_or_else(|| self.config.view.clone());
        tracing::debug!(
            entity = %self.entity,
            mode = ?self.mode,
            fields = schema.len(),
            "Form built",
        );

        Ok(Form {
            entity: self.entity,
            record: self.record,
            mode: self.mode,
            schema,
            rules_create: self.rules_create,
            rules_update: self.rules_update,
            store: self.store,
            disks: self.disks,
            config: self.config,
            before_save: self.before_save,
            before_save_relation: self.before_save_relation,
            form_data: self.form_data,
            view,
            input_views: self.input_views,
            view_data: self.view_data,
            action: self.action,
            styles: self.styles,
            scripts: self.scripts,
            old_input: self.old_input,
        })
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// A resolved form bound to one entity record.
///
/// A form instance handles one submission at a time; `submit` takes
/// `&mut self` so submissions cannot interleave on the same instance.
/// Blind retries after a failed submission are NOT idempotent: new
/// child-row identifiers are assigned by the entity store, so a retry
/// that races a partial persistence could duplicate children.
pub struct Form {
    pub(crate) entity: String,
    pub(crate) record: Record,
    pub(crate) mode: FormMode,
    pub(crate) schema: Schema,
    pub(crate) rules_create: RuleMap,
    pub(crate) rules_update: RuleMap,
    pub(crate) store: Arc<dyn EntityStore>,
    pub(crate) disks: Arc<DiskRegistry>,
    config: Arc<FormConfig>,
    pub(crate) before_save: Option<BeforeSaveHook>,
    pub(crate) before_save_relation: HashMap<String, BeforeSaveRelationHook>,
    form_data: Option<FormDataResolver>,
    view: String,
    input_views: HashMap<InputKind, String>,
    view_data: ValueMap,
    action: String,
    styles: Vec<String>,
    scripts: Vec<String>,
    old_input: Option<ValueMap>,
}

impl Form {
    /// Start building a form for `record` of type `entity`.
    pub fn builder(
        entity: impl Into<String>,
        record: Record,
        store: Arc<dyn EntityStore>,
        disks: Arc<DiskRegistry>,
        config: Arc<FormConfig>,
    ) -> FormBuilder {
        FormBuilder::new(entity, record, store, disks, config)
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn is_create(&self) -> bool {
        self.mode.is_create()
    }

    pub fn is_update(&self) -> bool {
        self.mode.is_update()
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The bound record. After a successful submission this reflects
    /// the persisted values, including a newly assigned id.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn fields(&self) -> &Schema {
        &self.schema
    }

    pub fn field(&self, key: &str) -> Option<&FieldKind> {
        self.schema.get(key)
    }

    /// The composed rule map for the active mode: caller base rules
    /// merged with per-field rules, relation children expanded.
    pub fn rules(&self) -> RuleMap {
        let base = match self.mode {
            FormMode::Create => &self.rules_create,
            FormMode::Update => &self.rules_update,
        };
        compose_rules(base, &self.schema)
    }

    /// Rule tokens for one composed path, mainly for renderers.
    pub fn rules_for(&self, path: &str) -> Vec<Rule> {
        self.rules().shift_remove(path).unwrap_or_default()
    }

    // ---- render surface ----

    pub fn view(&self) -> &str {
        &self.view
    }

    /// Per-input view: form override first, then config default.
    pub fn input_view(&self, kind: InputKind) -> Option<&str> {
        self.input_views
            .get(&kind)
            .map(String::as_str)
            .or_else(|| self.config.input_view(kind))
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    /// Config defaults overlaid with this form's view data, then passed
    /// through the form-data resolver when one is registered.
    pub fn view_data(&self) -> ValueMap {
        let mut data = self.config.view_data.clone();
        for (key, value) in &self.view_data {
            data.insert(key.clone(), value.clone());
        }
        match &self.form_data {
            Some(resolver) => resolver(data),
            None => data,
        }
    }

    /// The value a renderer should show for `key`.
    ///
    /// Precedence: the field's default value, then the persisted value
    /// (update mode, passed through the render-value resolver), then
    /// the old-input override. Relation values render as an empty
    /// string instead of leaking row objects. Reading is pure; calling
    /// twice without an intervening submission returns the same value.
    pub fn render_value(&self, key: &str) -> Value {
        let field = self.schema.get(key);

        let mut value = match field {
            Some(FieldKind::Scalar(f)) => f.default_value.clone().unwrap_or(Value::Null),
            _ => Value::Null,
        };

        if self.mode.is_update() {
            if let Some(persisted) = self.record.get(key) {
                value = persisted.clone();
            }
            if let Some(FieldKind::Scalar(f)) = field {
                if let Some(resolver) = &f.render_value {
                    value = resolver(value, &self.context());
                }
            }
        }

        if matches!(field, Some(FieldKind::Relation(_))) {
            return if value.is_object() || value.is_array() {
                Value::String(String::new())
            } else {
                value
            };
        }

        if let Some(old) = self.old_input.as_ref().and_then(|map| map.get(key)) {
            if !old.is_null() {
                return old.clone();
            }
        }
        if value.is_object() {
            Value::String(String::new())
        } else {
            value
        }
    }

    /// Snapshot handed to strategy functions. `entity_id` is `None`
    /// until the root entity has been persisted.
    pub(crate) fn context(&self) -> SubmissionContext {
        SubmissionContext {
            mode: self.mode,
            entity: self.entity.clone(),
            entity_id: self.record.id,
        }
    }
}
