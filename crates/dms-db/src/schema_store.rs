//! Schema row persistence.
//!
//! All operations run against the `json_schemas` table. Version assignment
//! locks the code's rows (`SELECT MAX(version) ... FOR UPDATE`) inside a
//! transaction; the `(schema_code, version)` unique key turns any remaining
//! race into a [`StoreError::Conflict`].

use chrono::{DateTime, Utc};
use dms_core::{
    MigrationScript, NewSchema, SchemaCode, SchemaDefinition, SchemaFilter, SchemaVersion,
    SqlIdentifier, StoreError, VirtualColumnConfig,
};
use dms_schema::SchemaStore;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::MySqlPool;

use crate::store_error;

const SELECT_COLUMNS: &str = "SELECT id, schema_code, CAST(version AS SIGNED) AS version, \
     table_name, schema_definition, migration_script, virtual_columns, is_active, \
     created_at, updated_at FROM json_schemas";

/// [`SchemaStore`] over a MariaDB pool.
#[derive(Debug, Clone)]
pub struct MySqlSchemaStore {
    pool: MySqlPool,
}

impl MySqlSchemaStore {
    /// A store over `pool`.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<SchemaDefinition>, StoreError> {
        let row = sqlx::query_as::<_, SchemaRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("fetch schema"))?;
        row.map(SchemaRow::into_record).transpose()
    }
}

impl SchemaStore for MySqlSchemaStore {
    async fn insert_next_version(&self, new: NewSchema) -> Result<SchemaDefinition, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("begin schema insert"))?;

        let max: i64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(MAX(version), 0) AS SIGNED) FROM json_schemas \
             WHERE schema_code = ? FOR UPDATE",
        )
        .bind(new.code.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error("lock schema versions"))?;
        let version = SchemaVersion::new(max + 1).map_err(|e| StoreError::corrupt("assign version", e))?;

        let migration_script = new.migration_script.as_ref().map(Json);
        let result = sqlx::query(
            "INSERT INTO json_schemas (schema_code, version, table_name, schema_definition, \
             migration_script, virtual_columns, is_active) VALUES (?, ?, ?, ?, ?, ?, TRUE)",
        )
        .bind(new.code.as_str())
        .bind(i64::from(version.get()))
        .bind(new.table_name.as_ref().map(SqlIdentifier::as_str))
        .bind(Json(&new.definition))
        .bind(migration_script)
        .bind(Json(&new.virtual_columns))
        .execute(&mut *tx)
        .await
        .map_err(store_error("insert schema version"))?;

        tx.commit().await.map_err(store_error("commit schema insert"))?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|e| StoreError::corrupt("insert schema version", e))?;
        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| StoreError::database("insert schema version", format!("row {id} vanished after insert")))
    }

    async fn find_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        let row = sqlx::query_as::<_, SchemaRow>(&format!(
            "{SELECT_COLUMNS} WHERE schema_code = ? AND version = ?"
        ))
        .bind(code.as_str())
        .bind(i64::from(version.get()))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("find schema version"))?;
        row.map(SchemaRow::into_record).transpose()
    }

    async fn find_latest_active(
        &self,
        code: &SchemaCode,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        let row = sqlx::query_as::<_, SchemaRow>(&format!(
            "{SELECT_COLUMNS} WHERE schema_code = ? AND is_active = TRUE \
             ORDER BY version DESC LIMIT 1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("find latest schema"))?;
        row.map(SchemaRow::into_record).transpose()
    }

    async fn list(&self, filter: &SchemaFilter) -> Result<Vec<SchemaDefinition>, StoreError> {
        let (sql, pattern) = list_query(filter);
        let mut query = sqlx::query_as::<_, SchemaRow>(&sql);
        if let Some(pattern) = pattern {
            query = query.bind(pattern);
        }
        if let Some(active) = filter.active {
            query = query.bind(active);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list schemas"))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row.into_record()?);
        }
        Ok(records)
    }

    async fn set_active(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
        active: bool,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        sqlx::query("UPDATE json_schemas SET is_active = ? WHERE schema_code = ? AND version = ?")
            .bind(active)
            .bind(code.as_str())
            .bind(i64::from(version.get()))
            .execute(&self.pool)
            .await
            .map_err(store_error("set schema active"))?;

        // Affected-row counts are 0 when the flag already had the requested
        // value, so existence is decided by re-reading the row.
        self.find_version(code, version).await
    }
}

/// SQL text and optional LIKE pattern for a listing filter. Bind order is
/// pattern first, then the active flag.
fn list_query(filter: &SchemaFilter) -> (String, Option<String>) {
    let mut clauses = Vec::new();
    let pattern = filter.code_contains.as_ref().map(|needle| {
        clauses.push("LOWER(schema_code) LIKE ?");
        format!("%{}%", escape_like(&needle.to_ascii_lowercase()))
    });
    if filter.active.is_some() {
        clauses.push("is_active = ?");
    }
    let mut sql = SELECT_COLUMNS.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY schema_code, version");
    (sql, pattern)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct SchemaRow {
    id: i64,
    schema_code: String,
    version: i64,
    table_name: Option<String>,
    schema_definition: Json<Value>,
    migration_script: Option<Json<Value>>,
    virtual_columns: Option<Json<Value>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SchemaRow {
    fn into_record(self) -> Result<SchemaDefinition, StoreError> {
        const OP: &str = "decode schema row";
        let code = SchemaCode::new(self.schema_code).map_err(|e| StoreError::corrupt(OP, e))?;
        let version = SchemaVersion::new(self.version).map_err(|e| StoreError::corrupt(OP, e))?;
        let table_name = self
            .table_name
            .map(SqlIdentifier::new)
            .transpose()
            .map_err(|e| StoreError::corrupt(OP, e))?;
        let migration_script = match self.migration_script {
            None | Some(Json(Value::Null)) => None,
            Some(Json(raw)) => Some(
                serde_json::from_value::<MigrationScript>(raw)
                    .map_err(|e| StoreError::corrupt(OP, format!("migration_script of row {}: {e}", self.id)))?,
            ),
        };
        let virtual_columns = match self.virtual_columns {
            None | Some(Json(Value::Null)) => Vec::new(),
            Some(Json(raw)) => serde_json::from_value::<Vec<VirtualColumnConfig>>(raw)
                .map_err(|e| StoreError::corrupt(OP, format!("virtual_columns of row {}: {e}", self.id)))?,
        };
        Ok(SchemaDefinition {
            id: self.id,
            code,
            version,
            table_name,
            definition: self.schema_definition.0,
            migration_script,
            virtual_columns,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> SchemaRow {
        SchemaRow {
            id: 7,
            schema_code: "RFA_DWG_V1".into(),
            version: 2,
            table_name: Some("rfa_revisions".into()),
            schema_definition: Json(json!({"type": "object"})),
            migration_script: Some(Json(json!({
                "steps": [{"type": "FIELD_RENAME", "config": {"old_field": "a", "new_field": "b"}}]
            }))),
            virtual_columns: Some(Json(json!([
                {"column_name": "v_no", "json_path": "$.no", "data_type": "VARCHAR", "index_type": "INDEX"}
            ]))),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_decodes_into_schema_definition() {
        let def = row().into_record().unwrap();
        assert_eq!(def.code.as_str(), "RFA_DWG_V1");
        assert_eq!(def.version.get(), 2);
        assert_eq!(def.table_name.unwrap().as_str(), "rfa_revisions");
        assert_eq!(def.migration_script.unwrap().steps.len(), 1);
        assert_eq!(def.virtual_columns.len(), 1);
    }

    #[test]
    fn null_json_columns_decode_as_absent() {
        let mut r = row();
        r.migration_script = Some(Json(Value::Null));
        r.virtual_columns = None;
        let def = r.into_record().unwrap();
        assert!(def.migration_script.is_none());
        assert!(def.virtual_columns.is_empty());
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let mut r = row();
        r.table_name = Some("drop table;".into());
        assert!(matches!(r.into_record(), Err(StoreError::Corrupt { .. })));

        let mut r = row();
        r.version = 0;
        assert!(matches!(r.into_record(), Err(StoreError::Corrupt { .. })));

        let mut r = row();
        r.virtual_columns = Some(Json(json!({"not": "a list"})));
        assert!(matches!(r.into_record(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn list_query_shapes() {
        let (sql, pattern) = list_query(&SchemaFilter::default());
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY schema_code, version"));
        assert!(pattern.is_none());

        let (sql, pattern) = list_query(&SchemaFilter {
            code_contains: Some("RFA_".into()),
            active: Some(true),
        });
        assert!(sql.contains("WHERE LOWER(schema_code) LIKE ? AND is_active = ?"));
        assert_eq!(pattern.as_deref(), Some("%rfa\\_%"));
    }
}
