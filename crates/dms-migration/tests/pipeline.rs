//! End-to-end migrations against the in-memory schema and document stores.

use std::sync::Arc;

use dms_core::{
    EntityRef, MigrationScript, MigrationStep, NewSchema, SchemaCode, SchemaVersion,
    SecurityContext, SqlIdentifier, StepType,
};
use dms_crypto::Cipher;
use dms_migration::{
    InMemoryDocumentStore, MigrationError, MigrationPipeline,
};
use dms_schema::{FieldSecurityProcessor, InMemorySchemaStore, SchemaError, SchemaRegistry};
use serde_json::{json, Value};

type Pipeline = MigrationPipeline<InMemorySchemaStore, InMemoryDocumentStore>;

fn code() -> SchemaCode {
    SchemaCode::new("RFA_DWG_V1").unwrap()
}

fn entity(id: i64) -> EntityRef {
    EntityRef::new(SqlIdentifier::new("rfa_revisions").unwrap(), id)
}

fn v(n: i64) -> SchemaVersion {
    SchemaVersion::new(n).unwrap()
}

fn v1() -> Value {
    json!({
        "type": "object",
        "required": ["drawingNo"],
        "properties": {
            "drawingNo": {"type": "string"},
            "cost_center": {"type": "string"}
        }
    })
}

fn v2() -> Value {
    json!({
        "type": "object",
        "required": ["drawingNo", "cost_center_code"],
        "properties": {
            "drawingNo": {"type": "string"},
            "cost_center_code": {"type": "string"}
        },
        "additionalProperties": false
    })
}

/// Registry with v1 and a v2 that renames `cost_center`.
async fn setup() -> (Pipeline, InMemoryDocumentStore) {
    let registry = SchemaRegistry::with_default_cache(InMemorySchemaStore::new());
    registry.create_or_update(code(), v1()).await.unwrap();
    registry
        .register(
            NewSchema::new(code(), v2()).with_migration_script(MigrationScript::new(vec![
                MigrationStep::rename("cost_center", "cost_center_code"),
            ])),
        )
        .await
        .unwrap();

    let documents = InMemoryDocumentStore::new();
    let pipeline = MigrationPipeline::new(Arc::new(registry), documents.clone());
    (pipeline, documents)
}

#[tokio::test]
async fn rename_migration_to_latest() {
    let (pipeline, documents) = setup().await;
    documents.insert(
        entity(1),
        Some(json!({"drawingNo": "A-101", "cost_center": "CC-7"})),
        Some(1),
    );

    let result = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.from_version, v(1));
    assert_eq!(result.to_version, v(2));
    assert_eq!(result.migrated_fields, vec!["cost_center_code".to_string()]);
    assert!(result.warnings.is_empty());

    let stored = documents.get(&entity(1)).await.unwrap();
    assert_eq!(
        stored.details,
        Some(json!({"drawingNo": "A-101", "cost_center_code": "CC-7"}))
    );
    assert_eq!(stored.schema_version, Some(2));
}

#[tokio::test]
async fn missing_version_column_counts_as_v1() {
    let (pipeline, documents) = setup().await;
    documents.insert(
        entity(1),
        Some(json!({"drawingNo": "A-1", "cost_center": "CC-1"})),
        None,
    );
    let result = pipeline
        .migrate_data(&entity(1), &code(), Some(v(2)))
        .await
        .unwrap();
    assert_eq!(result.from_version, v(1));

    documents.insert(
        entity(2),
        Some(json!({"drawingNo": "A-2", "cost_center": "CC-2"})),
        Some(-3),
    );
    let result = pipeline
        .migrate_data(&entity(2), &code(), Some(v(2)))
        .await
        .unwrap();
    assert_eq!(result.from_version, v(1));
}

#[tokio::test]
async fn out_of_range_version_is_rejected_and_row_kept() {
    let (pipeline, documents) = setup().await;
    let details = json!({"drawingNo": "A-1", "cost_center": "CC-1"});
    documents.insert(entity(1), Some(details.clone()), Some(5_000_000_000));

    let err = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap_err();
    match err {
        MigrationError::MalformedDocument { reason, .. } => {
            assert!(reason.contains("5000000000"));
        }
        other => panic!("expected MalformedDocument, got {other:?}"),
    }

    let row = documents.get(&entity(1)).await.unwrap();
    assert_eq!(row.details, Some(details));
    assert_eq!(row.schema_version, Some(5_000_000_000));
}

#[tokio::test]
async fn at_or_above_target_is_noop() {
    let (pipeline, documents) = setup().await;
    let details = json!({"drawingNo": "A-1", "cost_center_code": "CC-1"});
    documents.insert(entity(1), Some(details.clone()), Some(2));
    documents.insert(entity(2), Some(details.clone()), Some(5));

    let same = pipeline
        .migrate_data(&entity(1), &code(), Some(v(2)))
        .await
        .unwrap();
    assert!(same.is_noop());
    assert_eq!(same.from_version, v(2));
    assert!(same.migrated_fields.is_empty());

    let above = pipeline
        .migrate_data(&entity(2), &code(), None)
        .await
        .unwrap();
    assert_eq!((above.from_version, above.to_version), (v(5), v(5)));

    let stored = documents.get(&entity(2)).await.unwrap();
    assert_eq!(stored.details, Some(details));
    assert_eq!(stored.schema_version, Some(5));
}

#[tokio::test]
async fn failed_validation_leaves_row_unchanged() {
    let (pipeline, documents) = setup().await;
    // No cost_center to rename, so v2's required cost_center_code is missing.
    let original = json!({"drawingNo": "A-101"});
    documents.insert(entity(1), Some(original.clone()), Some(1));

    let err = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap_err();
    match &err {
        MigrationError::MigrationValidationFailed {
            version,
            violations,
            ..
        } => {
            assert_eq!(*version, v(2));
            assert!(violations.mentions("cost_center_code"));
        }
        other => panic!("expected MigrationValidationFailed, got {other:?}"),
    }

    let stored = documents.get(&entity(1)).await.unwrap();
    assert_eq!(stored.details, Some(original));
    assert_eq!(stored.schema_version, Some(1));
}

#[tokio::test]
async fn unknown_entity_and_schema() {
    let (pipeline, _documents) = setup().await;
    let err = pipeline
        .migrate_data(&entity(404), &code(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::EntityNotFound { .. }));

    let err = pipeline
        .migrate_data(&entity(404), &SchemaCode::new("NOPE").unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Schema(SchemaError::SchemaNotFound { .. })
    ));
}

#[tokio::test]
async fn malformed_and_null_details() {
    let (pipeline, documents) = setup().await;
    documents.insert(entity(1), Some(json!(["not", "an", "object"])), Some(1));
    let err = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::MalformedDocument { .. }));

    // Null details start from an empty object, which fails v2's required keys.
    documents.insert(entity(2), None, Some(1));
    let err = pipeline
        .migrate_data(&entity(2), &code(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::MigrationValidationFailed { .. }));
}

#[tokio::test]
async fn multi_version_path_dedups_fields_and_reports_warnings() {
    let registry = SchemaRegistry::with_default_cache(InMemorySchemaStore::new());
    registry
        .create_or_update(code(), json!({"type": "object"}))
        .await
        .unwrap();
    registry
        .register(
            NewSchema::new(code(), json!({"type": "object"})).with_migration_script(
                MigrationScript::new(vec![
                    MigrationStep::add("status", json!("1")),
                    MigrationStep::new(StepType::StructureChange, json!({})),
                ]),
            ),
        )
        .await
        .unwrap();
    registry
        .register(
            NewSchema::new(
                code(),
                json!({"type": "object", "properties": {"status": {"type": "number"}}}),
            )
            .with_migration_script(MigrationScript::new(vec![MigrationStep::new(
                StepType::FieldTransform,
                json!({"field": "status", "transform": "TO_NUMBER"}),
            )])),
        )
        .await
        .unwrap();

    let documents = InMemoryDocumentStore::new();
    documents.insert(entity(1), Some(json!({})), Some(1));
    let pipeline = MigrationPipeline::new(Arc::new(registry), documents.clone());

    let result = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap();
    assert_eq!(result.to_version, v(3));
    assert_eq!(result.migrated_fields, vec!["status".to_string()]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].version, v(2));
    assert_eq!(result.warnings[0].step_index, 1);
    assert_eq!(result.warnings[0].step_type, "STRUCTURE_CHANGE");

    let stored = documents.get(&entity(1)).await.unwrap();
    assert_eq!(stored.details, Some(json!({"status": 1})));
}

#[tokio::test]
async fn concurrent_migrations_of_one_entity_serialize() {
    let (pipeline, documents) = setup().await;
    documents.insert(
        entity(1),
        Some(json!({"drawingNo": "A-101", "cost_center": "CC-7"})),
        Some(1),
    );
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.migrate_data(&entity(1), &code(), None).await })
        })
        .collect();

    let mut upgrades = 0;
    let mut noops = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.is_noop() {
            assert_eq!(result.from_version, v(2));
            noops += 1;
        } else {
            assert_eq!(result.from_version, v(1));
            upgrades += 1;
        }
    }
    assert_eq!(upgrades, 1);
    assert_eq!(noops, 3);

    let stored = documents.get(&entity(1)).await.unwrap();
    assert_eq!(stored.schema_version, Some(2));
}

#[tokio::test]
async fn encrypted_field_survives_rename_migration() {
    let processor = FieldSecurityProcessor::new(Cipher::from_key(&[9u8; 32]).unwrap());
    let registry = SchemaRegistry::with_default_cache(InMemorySchemaStore::new());
    registry
        .create_or_update(
            code(),
            json!({
                "type": "object",
                "required": ["drawingNo", "costCenter"],
                "properties": {
                    "drawingNo": {"type": "string"},
                    "costCenter": {"type": "string", "x-encrypt": true}
                }
            }),
        )
        .await
        .unwrap();

    let stored = registry
        .process_write_data(
            &code(),
            &json!({"drawingNo": "A-101", "costCenter": "CC-100"}),
            &processor,
        )
        .await
        .unwrap();
    assert_ne!(stored["costCenter"], json!("CC-100"));

    registry
        .register(
            NewSchema::new(
                code(),
                json!({
                    "type": "object",
                    "required": ["drawingNo", "cost_center_code"],
                    "properties": {
                        "drawingNo": {"type": "string"},
                        "cost_center_code": {"type": "string", "x-encrypt": true}
                    },
                    "additionalProperties": false
                }),
            )
            .with_migration_script(MigrationScript::new(vec![MigrationStep::rename(
                "costCenter",
                "cost_center_code",
            )])),
        )
        .await
        .unwrap();

    let documents = InMemoryDocumentStore::new();
    documents.insert(entity(1), Some(stored), Some(1));
    let pipeline = MigrationPipeline::new(Arc::new(registry), documents.clone());

    let result = pipeline
        .migrate_data(&entity(1), &code(), None)
        .await
        .unwrap();
    assert_eq!(result.migrated_fields, vec!["cost_center_code".to_string()]);
    assert_eq!((result.from_version, result.to_version), (v(1), v(2)));

    let row = documents.get(&entity(1)).await.unwrap();
    let details = row.details.unwrap();
    assert!(details.get("costCenter").is_none());
    assert_ne!(details["cost_center_code"], json!("CC-100"));

    let visible = pipeline
        .registry()
        .process_read_data(&code(), &details, &SecurityContext::anonymous(), &processor)
        .await
        .unwrap();
    assert_eq!(visible, json!({"drawingNo": "A-101", "cost_center_code": "CC-100"}));
}
