//! Relation synchronization tests: rule expansion, the to-many
//! diff/upsert passes, per-row attachment handling, and the to-one
//! upsert path.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{fixture, photo_fields, png, post_builder, post_form, values};
use formbind::{FormError, FormRequest};
use formbind_core::{Record, Rule};
use formbind_store::{BlobStore, EntityStore};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Rule expansion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relation_rules_expand_by_kind() {
    let fx = fixture();
    let form = post_form(&fx, Record::new()).await;

    let rules = form.rules();
    assert_eq!(rules["photos.*.caption"], vec![Rule::named("required")]);
    assert_eq!(rules["meta.note"], vec![Rule::parse("max:100")]);
    assert!(!rules.contains_key("meta.*.note"));
}

#[tokio::test]
async fn child_validation_blocks_the_submission() {
    let fx = fixture();
    let mut form = post_form(&fx, Record::new()).await;

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "ok" }, { "caption": "" }],
    }));
    let err = form.submit(&request).await.unwrap_err();

    let errors = err.validation_errors().expect("validation failure");
    assert_eq!(errors.messages("photos.1.caption").len(), 1);
    assert!(errors.messages("photos.0.caption").is_empty());
    assert_eq!(fx.store.count("posts").await, 0);
}

// ---------------------------------------------------------------------------
// To-many sync
// ---------------------------------------------------------------------------

/// Seed a post with three photos; returns (post_id, photo ids).
async fn seed_post_with_photos(fx: &common::Fixture) -> (i64, Vec<i64>) {
    let post_id = fx
        .store
        .insert("posts", values(&[("title", json!("post"))]))
        .await;
    let mut photo_ids = Vec::new();
    for caption in ["one", "two", "three"] {
        let id = fx
            .store
            .insert(
                "photos",
                values(&[("caption", json!(caption)), ("post_id", json!(post_id))]),
            )
            .await;
        photo_ids.push(id);
    }
    (post_id, photo_ids)
}

#[tokio::test]
async fn diff_deletes_updates_and_creates() {
    let fx = fixture();
    let (post_id, ids) = seed_post_with_photos(&fx).await;

    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [
            { "id": ids[0], "caption": "one updated" },
            { "id": ids[2], "caption": "three updated" },
            { "caption": "brand new" },
        ],
    }));
    form.submit(&request).await.unwrap();

    let rows = fx.store.rows("photos").await;
    assert_eq!(rows.len(), 3);

    let captions: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("caption").and_then(Value::as_str))
        .collect();
    assert_eq!(captions, vec!["one updated", "three updated", "brand new"]);

    // Row `two` is gone; the new row got a fresh id and the parent fk.
    assert!(!rows.iter().any(|r| r.id == Some(ids[1])));
    let created = rows.last().unwrap();
    assert_eq!(created.get("post_id"), Some(&json!(post_id)));
}

#[tokio::test]
async fn empty_submission_deletes_nothing() {
    let fx = fixture();
    let (post_id, _) = seed_post_with_photos(&fx).await;

    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;

    // All rows were removed client-side, but no submitted row carries
    // an identifier, so the deletion pass does not run.
    let request = FormRequest::new(json!({ "title": "post", "photos": [] }));
    form.submit(&request).await.unwrap();

    assert_eq!(fx.store.count("photos").await, 3);
}

#[tokio::test]
async fn id_less_rows_only_create() {
    let fx = fixture();
    let mut form = post_form(&fx, Record::new()).await;

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "a" }, { "caption": "b" }],
    }));
    form.submit(&request).await.unwrap();

    let post_id = form.record().id.unwrap();
    let rows = fx.store.rows("photos").await;
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r.get("post_id") == Some(&json!(post_id))));
}

#[tokio::test]
async fn non_array_relation_value_is_an_empty_submission() {
    let fx = fixture();
    let (post_id, _) = seed_post_with_photos(&fx).await;

    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;

    let request = FormRequest::new(json!({ "title": "post", "photos": "junk" }));
    form.submit(&request).await.unwrap();

    assert_eq!(fx.store.count("photos").await, 3);
}

// ---------------------------------------------------------------------------
// Per-row attachments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn child_uploads_write_paths_into_rows() {
    let fx = fixture();
    let mut form = post_form(&fx, Record::new()).await;

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "a" }, { "caption": "b" }],
    }))
    .with_file("photos.0.image", png("a.png"))
    .with_file("photos.1.image", png("b.png"));
    form.submit(&request).await.unwrap();

    let rows = fx.store.rows("photos").await;
    for row in &rows {
        let path = row.get("image").and_then(Value::as_str).unwrap();
        assert!(path.starts_with("photos/"));
        assert!(fx.blob.has(path).await.unwrap());
    }
    assert_eq!(fx.blob.len().await, 2);
}

#[tokio::test]
async fn child_reupload_deletes_the_old_file() {
    let fx = fixture();
    let post_id = fx
        .store
        .insert("posts", values(&[("title", json!("post"))]))
        .await;
    let photo_id = fx
        .store
        .insert(
            "photos",
            values(&[
                ("caption", json!("old")),
                ("image", json!("photos/old.png")),
                ("post_id", json!(post_id)),
            ]),
        )
        .await;
    fx.blob
        .put_file_as("photos", &png("old.png"), "old.png")
        .await
        .unwrap();

    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;
    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "id": photo_id, "caption": "new" }],
    }))
    .with_file("photos.0.image", png("new.png"));
    form.submit(&request).await.unwrap();

    assert!(!fx.blob.has("photos/old.png").await.unwrap());
    let rows = fx.store.rows("photos").await;
    let path = rows[0].get("image").and_then(Value::as_str).unwrap();
    assert_ne!(path, "photos/old.png");
    assert!(fx.blob.has(path).await.unwrap());
}

#[tokio::test]
async fn deleted_rows_lose_their_attachments() {
    let fx = fixture();
    let post_id = fx
        .store
        .insert("posts", values(&[("title", json!("post"))]))
        .await;
    let kept = fx
        .store
        .insert(
            "photos",
            values(&[
                ("caption", json!("kept")),
                ("image", json!("photos/kept.png")),
                ("post_id", json!(post_id)),
            ]),
        )
        .await;
    fx.store
        .insert(
            "photos",
            values(&[
                ("caption", json!("dropped")),
                ("image", json!("photos/dropped.png")),
                ("post_id", json!(post_id)),
            ]),
        )
        .await;
    for name in ["kept.png", "dropped.png"] {
        fx.blob.put_file_as("photos", &png(name), name).await.unwrap();
    }

    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;
    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "id": kept, "caption": "kept" }],
    }));
    form.submit(&request).await.unwrap();

    assert_eq!(fx.store.count("photos").await, 1);
    assert!(fx.blob.has("photos/kept.png").await.unwrap());
    assert!(!fx.blob.has("photos/dropped.png").await.unwrap());
}

#[tokio::test]
async fn failed_child_upload_hook_compensates_everything() {
    let fx = fixture();
    let mut form = post_builder(&fx, Record::new())
        .process_file(
            "photos.image",
            Arc::new(|_, _| Box::pin(async { Err(anyhow::anyhow!("rejected")) })),
        )
        .unwrap()
        .build()
        .await
        .unwrap();

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "a" }],
    }))
    .with_file("cover", png("cover.png"))
    .with_file("photos.0.image", png("a.png"));
    let err = form.submit(&request).await.unwrap_err();

    // The root cover was stored before the child hook failed; both
    // writes are compensated and neither row survives.
    assert_matches!(err, FormError::ProcessFile { .. });
    assert!(fx.blob.is_empty().await);
    assert_eq!(fx.store.count("posts").await, 0);
    assert_eq!(fx.store.count("photos").await, 0);
}

// ---------------------------------------------------------------------------
// To-one sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn to_one_creates_then_updates_a_single_row() {
    let fx = fixture();
    let mut form = post_form(&fx, Record::new()).await;

    let request = FormRequest::new(json!({
        "title": "post",
        "meta": { "note": "first" },
    }));
    form.submit(&request).await.unwrap();

    let post_id = form.record().id.unwrap();
    let rows = fx.store.rows("post_meta").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note"), Some(&json!("first")));
    assert_eq!(rows[0].get("post_id"), Some(&json!(post_id)));

    // Second submission binds onto the same row.
    let record = fx.store.find("posts", post_id).await.unwrap().unwrap();
    let mut form = post_form(&fx, record).await;
    form.submit(&FormRequest::new(json!({
        "title": "post",
        "meta": { "note": "second" },
    })))
    .await
    .unwrap();

    let rows = fx.store.rows("post_meta").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note"), Some(&json!("second")));
}

#[tokio::test]
async fn absent_to_one_value_is_a_no_op() {
    let fx = fixture();
    let mut form = post_form(&fx, Record::new()).await;
    form.submit(&FormRequest::new(json!({ "title": "post" })))
        .await
        .unwrap();
    assert_eq!(fx.store.count("post_meta").await, 0);
}

// ---------------------------------------------------------------------------
// Hooks and resolvers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn before_save_relation_hook_runs_per_row() {
    let fx = fixture();
    let mut form = post_builder(&fx, Record::new())
        .before_save_relation(
            "photos",
            Arc::new(|row, ctx| {
                row.set("post_ref", json!(ctx.entity_id));
            }),
        )
        .unwrap()
        .build()
        .await
        .unwrap();

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "a" }, { "caption": "b" }],
    }));
    form.submit(&request).await.unwrap();

    let post_id = form.record().id.unwrap();
    let rows = fx.store.rows("photos").await;
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r.get("post_ref") == Some(&json!(post_id))));
}

#[tokio::test]
async fn child_submit_value_resolver_runs_per_row() {
    let fx = fixture();
    let mut form = post_builder(&fx, Record::new())
        .resolve_submit_value(
            "photos.caption",
            Arc::new(|value, _ctx| match value.as_str() {
                Some(s) => json!(s.to_uppercase()),
                None => value,
            }),
        )
        .unwrap()
        .build()
        .await
        .unwrap();

    let request = FormRequest::new(json!({
        "title": "post",
        "photos": [{ "caption": "quiet" }],
    }));
    form.submit(&request).await.unwrap();

    let rows = fx.store.rows("photos").await;
    assert_eq!(rows[0].get("caption"), Some(&json!("QUIET")));
}

// ---------------------------------------------------------------------------
// Relation contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_relation_key_fails_fast() {
    let fx = fixture();
    let err = post_builder(&fx, Record::new())
        .with_many("tags", "Tags", photo_fields())
        .unwrap_err();
    assert_matches!(err, FormError::RelationContract(key) if key == "tags");

    let err = post_builder(&fx, Record::new())
        .before_save_relation("tags", Arc::new(|_, _| {}))
        .unwrap_err();
    assert_matches!(err, FormError::RelationContract(key) if key == "tags");
}

#[tokio::test]
async fn relation_kind_mismatch_is_a_schema_error() {
    let fx = fixture();
    // `photos` is to-many; registering it as to-one is rejected.
    let err = post_builder(&fx, Record::new())
        .with_one("photos", "Photos", photo_fields())
        .unwrap_err();
    assert_matches!(err, FormError::Core(_));
}
