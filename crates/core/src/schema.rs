//! Schema resolution: raw field declarations into validated descriptors.
//!
//! Resolution happens once, at form construction. Everything that can
//! be malformed in a declaration — missing upload metadata, relations
//! nested inside relations — is rejected here with a
//! [`CoreError::Schema`] so that submit-time code only ever sees
//! well-formed descriptors. Accessor existence for explicitly
//! registered relations is the form builder's check.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::field::{
    default_upload_filename, FieldDescriptor, FieldKind, InputKind, RawField, RelationDef,
    RelationFieldDescriptor, UploadSpec,
};
use crate::types::FormMode;

/// Resolved field map, in declaration order.
pub type Schema = IndexMap<String, FieldKind>;

/// Read-only view of the relation schema an entity store exposes.
///
/// `relation_of` answers "does `entity` expose a relation under `key`,
/// and of what shape" — the replacement for probing model accessor
/// methods at runtime.
pub trait RelationInspector {
    fn relation_of(&self, entity: &str, key: &str) -> Option<RelationDef>;
}

/// Resolve a raw field map for `entity` in the given mode.
///
/// An entry is a relation field only when the inspector exposes a
/// relation under its key AND the entry declares child fields; every
/// other combination resolves as a scalar. Relation snapshots
/// (`existing_rows`) are left empty — the form constructor materializes
/// them through the entity store.
pub fn resolve_fields(
    entity: &str,
    raw: IndexMap<String, RawField>,
    mode: FormMode,
    inspector: &dyn RelationInspector,
) -> Result<Schema, CoreError> {
    let mut out = Schema::with_capacity(raw.len());
    for (key, field) in raw {
        let resolved = match inspector.relation_of(entity, &key) {
            Some(def) if field.fields.is_some() => {
                FieldKind::Relation(build_relation(&key, field, def, mode, inspector)?)
            }
            _ => FieldKind::Scalar(resolve_scalar(&key, field, mode)?),
        };
        out.insert(key, resolved);
    }
    Ok(out)
}

fn build_relation(
    key: &str,
    mut raw: RawField,
    def: RelationDef,
    mode: FormMode,
    inspector: &dyn RelationInspector,
) -> Result<RelationFieldDescriptor, CoreError> {
    let child_raw = raw.fields.take().unwrap_or_default();
    let mut fields = IndexMap::with_capacity(child_raw.len());
    for (child_key, child) in child_raw {
        if child.fields.is_some() && inspector.relation_of(&def.related, &child_key).is_some() {
            return Err(CoreError::Schema(format!(
                "Relation field '{key}' must not contain a nested relation field '{child_key}'"
            )));
        }
        let resolved = resolve_scalar(&child_key, child, mode)?;
        fields.insert(child_key, resolved);
    }

    Ok(RelationFieldDescriptor {
        name: key.to_string(),
        label: raw.label,
        exists: raw.exists.unwrap_or(true),
        relation: def,
        fields,
        existing_rows: Vec::new(),
    })
}

fn resolve_scalar(key: &str, raw: RawField, mode: FormMode) -> Result<FieldDescriptor, CoreError> {
    let raw = apply_mode_overrides(raw, mode);

    let rules = match mode {
        FormMode::Create => raw.rules_create.or(raw.rules),
        FormMode::Update => raw.rules_update.or(raw.rules),
    }
    .unwrap_or_default()
    .into_rules();
    let required = rules.iter().any(|r| r.name == "required");

    let input = raw.input.unwrap_or(InputKind::Text);
    let upload = if input.is_uploadable() {
        let disk = raw.upload_disk.ok_or_else(|| {
            CoreError::Schema(format!("Field '{key}' must declare an upload disk"))
        })?;
        let path = raw.upload_path.ok_or_else(|| {
            CoreError::Schema(format!("Field '{key}' must declare an upload path"))
        })?;
        Some(UploadSpec {
            disk,
            path,
            filename: raw.upload_filename.unwrap_or_else(default_upload_filename),
            delete_old_file: raw.delete_old_file,
            process_file: raw.process_file,
        })
    } else {
        None
    };

    Ok(FieldDescriptor {
        name: key.to_string(),
        label: raw.label,
        input,
        exists: raw.exists.unwrap_or(true),
        disabled: raw.disabled.unwrap_or(false),
        rules,
        required,
        default_value: raw.default_value,
        upload,
        submit_value: raw.submit_value,
        render_value: raw.render_value,
    })
}

/// Fold the mode-matching `if_create`/`if_update` override block into
/// the base declaration. Declared override attributes replace the base
/// ones; everything else is kept.
fn apply_mode_overrides(mut raw: RawField, mode: FormMode) -> RawField {
    let overrides = match mode {
        FormMode::Create => raw.if_create.take(),
        FormMode::Update => raw.if_update.take(),
    };
    let Some(ov) = overrides else {
        return raw;
    };
    let ov = *ov;

    RawField {
        input: ov.input.or(raw.input),
        label: ov.label.or(raw.label),
        exists: ov.exists.or(raw.exists),
        disabled: ov.disabled.or(raw.disabled),
        rules: ov.rules.or(raw.rules),
        rules_create: ov.rules_create.or(raw.rules_create),
        rules_update: ov.rules_update.or(raw.rules_update),
        default_value: ov.default_value.or(raw.default_value),
        upload_disk: ov.upload_disk.or(raw.upload_disk),
        upload_path: ov.upload_path.or(raw.upload_path),
        upload_filename: ov.upload_filename.or(raw.upload_filename),
        delete_old_file: ov.delete_old_file || raw.delete_old_file,
        process_file: ov.process_file.or(raw.process_file),
        submit_value: ov.submit_value.or(raw.submit_value),
        render_value: ov.render_value.or(raw.render_value),
        if_create: None,
        if_update: None,
        fields: ov.fields.or(raw.fields),
    }
}
