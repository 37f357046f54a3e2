//! PostgreSQL repository using sqlx.

use super::{SchemaProbe, TotalsRepository};
use crate::config::SchemaConfig;
use crate::error::Result;
use crate::totals::{EntityKind, OwnerId};
use sqlx::PgPool;
use std::collections::BTreeSet;

/// Counts owned entities with one `COUNT(*)` per table.
///
/// Table and column names come from [`SchemaConfig`] and are interpolated
/// into the SQL text; they must be trusted configuration, never user input.
///
/// # Example
///
/// ```no_run
/// # use owner_totals::repository::PgRepository;
/// # use owner_totals::config::SchemaConfig;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = sqlx::PgPool::connect("postgres://localhost/recetario").await?;
/// let repo = PgRepository::new(pool, SchemaConfig::default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    schema: SchemaConfig,
}

impl PgRepository {
    pub fn new(pool: PgPool, schema: SchemaConfig) -> Self {
        Self { pool, schema }
    }

    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }
}

impl TotalsRepository for PgRepository {
    async fn count_owned(&self, kind: EntityKind, owner: OwnerId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.schema.count_query(kind))
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn owner_ids(&self) -> Result<Vec<OwnerId>> {
        let sql = format!("SELECT id FROM {} ORDER BY id", self.schema.users_table);
        let ids: Vec<i64> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(ids)
    }
}

impl SchemaProbe for PgRepository {
    async fn tables_exist(&self, tables: &[String]) -> Result<bool> {
        let wanted = distinct_tables(tables);
        let expected = wanted.len();
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT table_name) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = ANY($1)",
        )
        .bind(wanted)
        .fetch_one(&self.pool)
        .await?;

        debug!("Schema check: {}/{} tables present", found, expected);
        Ok(found as usize == expected)
    }
}

/// Table names without duplicates, so the count compares against what
/// `COUNT(DISTINCT ...)` can return.
fn distinct_tables(tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
