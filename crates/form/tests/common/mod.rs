//! Shared fixtures: a `posts` entity with a to-many `photos` relation
//! and a to-one `meta` relation, backed by the in-memory stores.

use std::sync::Arc;

use formbind::{Form, FormBuilder, FormConfig};
use formbind_core::{
    InputKind, RawField, Record, RelationDef, RelationKind, UploadedFile, ValueMap,
};
use formbind_store::{DiskRegistry, MemoryBlobStore, MemoryEntityStore};
use indexmap::{indexmap, IndexMap};
use serde_json::Value;

pub struct Fixture {
    pub store: Arc<MemoryEntityStore>,
    pub blob: Arc<MemoryBlobStore>,
    pub disks: Arc<DiskRegistry>,
    pub config: Arc<FormConfig>,
}

/// In-memory stores with the fixture relations declared.
pub fn fixture() -> Fixture {
    let store = Arc::new(
        MemoryEntityStore::new()
            .with_relation(
                "posts",
                "photos",
                RelationDef {
                    kind: RelationKind::ToMany,
                    related: "photos".to_string(),
                    foreign_key: "post_id".to_string(),
                },
            )
            .with_relation(
                "posts",
                "meta",
                RelationDef {
                    kind: RelationKind::ToOne,
                    related: "post_meta".to_string(),
                    foreign_key: "post_id".to_string(),
                },
            ),
    );
    let blob = Arc::new(MemoryBlobStore::new());
    let disks = Arc::new(DiskRegistry::new().with_disk("public", blob.clone() as _));
    let config = Arc::new(FormConfig::themed("bs3"));
    Fixture {
        store,
        blob,
        disks,
        config,
    }
}

pub fn post_fields() -> IndexMap<String, RawField> {
    indexmap! {
        "title".to_string() => RawField::new(InputKind::Text).rules("required|min:3"),
        "body".to_string() => RawField::new(InputKind::Textarea),
        "cover".to_string() => RawField::new(InputKind::Image)
            .upload("public", "covers")
            .delete_old_file(),
    }
}

pub fn photo_fields() -> IndexMap<String, RawField> {
    indexmap! {
        "caption".to_string() => RawField::new(InputKind::Text).rules("required"),
        "image".to_string() => RawField::new(InputKind::Image)
            .upload("public", "photos")
            .delete_old_file(),
    }
}

pub fn meta_fields() -> IndexMap<String, RawField> {
    indexmap! {
        "note".to_string() => RawField::new(InputKind::Text).rules("max:100"),
    }
}

/// Builder for the canonical posts form; tests add hooks before `build`.
pub fn post_builder(fx: &Fixture, record: Record) -> FormBuilder {
    Form::builder(
        "posts",
        record,
        fx.store.clone(),
        fx.disks.clone(),
        fx.config.clone(),
    )
    .fields(post_fields())
    .with_many("photos", "Photos", photo_fields())
    .expect("photos relation is declared on the fixture store")
    .with_one("meta", "Meta", meta_fields())
    .expect("meta relation is declared on the fixture store")
}

pub async fn post_form(fx: &Fixture, record: Record) -> Form {
    post_builder(fx, record)
        .build()
        .await
        .expect("fixture schema resolves")
}

pub fn values(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A tiny PNG-flavored upload.
pub fn png(name: &str) -> UploadedFile {
    UploadedFile::new(name, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
        .with_content_type("image/png")
}
