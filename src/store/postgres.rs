use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder, Row};

use super::{Document, DocumentStore, RatingStats, StoreError, new_id, render_value};
use crate::query::{Comparison, Direction, Filter, ID_FIELD, METADATA_FIELD, Query, eval};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)
"#;

/// Document store on a single PostgreSQL `documents` table with JSONB bodies.
/// Field names from queries are always bound as parameters, never spliced.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'tours_backend';").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn index_name(collection: &str, field: &str) -> String {
        format!("documents_{collection}_{field}_key")
    }

    fn map_write_error(err: sqlx::Error, collection: &str, document: &Document) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let field = db
                    .constraint()
                    .and_then(|name| name.strip_prefix(&format!("documents_{collection}_")))
                    .and_then(|rest| rest.strip_suffix("_key"))
                    .unwrap_or(ID_FIELD)
                    .to_string();
                let value = render_value(document.get(&field));
                return StoreError::DuplicateKey { field, value };
            }
        }
        StoreError::from(err)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn body(row: &PgRow) -> Result<Document, StoreError> {
    let Json(value): Json<Value> = row.try_get("body")?;
    match value {
        Value::Object(document) => Ok(document),
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object body, found {other}"
        ))),
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for predicate in filter.predicates() {
        let field = predicate.field.clone();
        let value = predicate.value.clone();
        builder.push(" AND ");
        match predicate.op {
            // text comparison covers numbers stored as strings and vice versa
            Comparison::Eq => {
                let text = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                builder
                    .push("(body -> ")
                    .push_bind(field.clone())
                    .push("::text = ")
                    .push_bind(Json(value))
                    .push(" OR body ->> ")
                    .push_bind(field)
                    .push("::text = ")
                    .push_bind(text)
                    .push(")");
            }
            Comparison::Ne => {
                builder
                    .push("(body -> ")
                    .push_bind(field)
                    .push("::text) IS DISTINCT FROM ")
                    .push_bind(Json(value));
            }
            op => {
                let symbol = match op {
                    Comparison::Gt => " > ",
                    Comparison::Gte => " >= ",
                    Comparison::Lt => " < ",
                    _ => " <= ",
                };
                // jsonb orders across types; only compare like with like
                builder
                    .push("(jsonb_typeof(body -> ")
                    .push_bind(field.clone())
                    .push("::text) = jsonb_typeof(")
                    .push_bind(Json(value.clone()))
                    .push(") AND body -> ")
                    .push_bind(field)
                    .push("::text")
                    .push(symbol)
                    .push_bind(Json(value))
                    .push(")");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        if !is_identifier(collection) || !is_identifier(field) {
            return Err(StoreError::InvalidDocument(format!(
                "cannot index {collection}.{field}"
            )));
        }
        let statement = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON documents ((body ->> '{field}')) \
             WHERE collection = '{collection}'",
            name = Self::index_name(collection, field),
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Document, StoreError> {
        let id = match document.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                document.insert(ID_FIELD.into(), Value::String(id.clone()));
                id
            }
        };
        document
            .entry(METADATA_FIELD)
            .or_insert_with(|| Value::from(0));

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(&document))
            .execute(&self.pool)
            .await
            .map_err(|err| Self::map_write_error(err, collection, &document))?;
        Ok(document)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filter(&mut builder, &query.filter);

        builder.push(" ORDER BY ");
        for key in &query.sort {
            builder.push("body -> ").push_bind(key.field.clone()).push("::text");
            builder.push(match key.direction {
                Direction::Ascending => " ASC NULLS FIRST, ",
                Direction::Descending => " DESC NULLS LAST, ",
            });
        }
        builder.push("created_at ASC");

        if let Some(page) = query.page {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.skip).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| body(row).map(|doc| eval::project(doc, &query.projection)))
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut builder =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filter(&mut builder, filter);
        let row = builder.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(body)
            .transpose()
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        sqlx::query(
            "UPDATE documents SET body = body || $3 WHERE collection = $1 AND id = $2 RETURNING body",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&patch))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Self::map_write_error(err, collection, &patch))?
        .as_ref()
        .map(body)
        .transpose()
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING body")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(body)
            .transpose()
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        // SKIP LOCKED: a racing caller sees no candidate instead of waiting
        // for a row that will no longer match once the winner commits.
        let mut builder = QueryBuilder::new("UPDATE documents SET body = body || ");
        builder
            .push_bind(Json(patch.clone()))
            .push(" WHERE (collection, id) = (SELECT collection, id FROM documents WHERE collection = ")
            .push_bind(collection.to_string());
        push_filter(&mut builder, filter);
        builder.push(" LIMIT 1 FOR UPDATE SKIP LOCKED) RETURNING body");

        builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Self::map_write_error(err, collection, &patch))?
            .as_ref()
            .map(body)
            .transpose()
    }

    async fn rating_stats(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<RatingStats, StoreError> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS count, AVG((body ->> ");
        builder
            .push_bind(field.to_string())
            .push("::text)::float8) AS average FROM documents WHERE collection = ")
            .push_bind(collection.to_string())
            .push(" AND jsonb_typeof(body -> ")
            .push_bind(field.to_string())
            .push("::text) = 'number'");
        push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        let average: Option<f64> = row.try_get("average")?;
        Ok(RatingStats {
            count: u64::try_from(count).unwrap_or_default(),
            average,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;

    fn where_clause(filter: &Filter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT body FROM documents WHERE TRUE");
        push_filter(&mut builder, filter);
        builder.sql().to_string()
    }

    #[test]
    fn range_predicates_require_matching_json_types() {
        let filter = Filter::new().and(Predicate::new("price", Comparison::Gte, "abc"));
        assert_eq!(
            where_clause(&filter),
            "SELECT body FROM documents WHERE TRUE AND (jsonb_typeof(body -> $1::text) = \
             jsonb_typeof($2) AND body -> $3::text >= $4)"
        );
    }

    #[test]
    fn equality_keeps_the_text_fallback() {
        let filter = Filter::new().and(Predicate::eq("difficulty", "easy"));
        let sql = where_clause(&filter);
        assert!(sql.contains("body ->> $3::text = $4"));
        assert!(!sql.contains("jsonb_typeof"));
    }

    #[test]
    fn identifiers_are_validated_before_indexing() {
        assert!(is_identifier("tours"));
        assert!(!is_identifier("tours; DROP TABLE documents"));
        assert!(!is_identifier(""));
    }
}
