use anyhow::{Context, Result};
use shared::query::{Page, QueryCriteria};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

pub mod entity;
pub mod filter_sort;

pub use entity::{Column, ColumnKind, Entity, SqlValue};
pub use filter_sort::{CriteriaError, QueryShape};

use entity::{folded_values, select_list};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own empty database,
        // so an in-memory store must live on exactly one connection.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Runs one filtered, sorted, optionally paged query. Never cached.
    pub async fn load<E: Entity>(&self, criteria: &QueryCriteria) -> Result<Page<E>> {
        let shape = filter_sort::shape::<E>(criteria)?;

        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
        shape.push_where(&mut count);
        let total_items: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to count {}", E::TABLE))?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", select_list::<E>(), E::TABLE));
        shape.apply(&mut select);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to load {}", E::TABLE))?;
        let items = rows
            .iter()
            .map(E::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total_items: u64::try_from(total_items).unwrap_or_default(),
        })
    }

    pub async fn find_by_id<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE id = ?",
            select_list::<E>(),
            E::TABLE
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to look up {} {id}", E::KIND))?;
        row.as_ref().map(E::from_row).transpose().map_err(Into::into)
    }

    /// Exact match on the business key; first match in id order. Always
    /// `None` for entities without a business key.
    pub async fn find_by_business_key<E: Entity>(&self, key: &str) -> Result<Option<E>> {
        let Some(column) = E::BUSINESS_KEY else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE {column} = ? ORDER BY id ASC LIMIT 1",
            select_list::<E>(),
            E::TABLE
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to look up {} by {column}", E::KIND))?;
        row.as_ref().map(E::from_row).transpose().map_err(Into::into)
    }

    pub async fn insert<E: Entity>(&self, draft: E::Draft) -> Result<E> {
        let mut tx = self.pool.begin().await?;

        let folded = folded_values::<E>(&draft);
        let mut columns = column_list::<E>();
        for (column, _) in &folded {
            columns.push_str(", ");
            columns.push_str(column);
        }

        let mut insert = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {} ({columns}) VALUES (",
            E::TABLE
        ));
        let mut values = insert.separated(", ");
        for value in E::draft_values(&draft) {
            match value {
                SqlValue::Text(text) => values.push_bind(text),
                SqlValue::Integer(number) => values.push_bind(number),
            };
        }
        for (_, text) in folded {
            values.push_bind(text);
        }
        insert.push(") RETURNING id");

        let row = insert
            .build()
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("failed to insert {}", E::KIND))?;
        let id = row.get::<i64, _>(0);

        tx.commit().await?;
        Ok(E::from_draft(id, draft))
    }

    /// Overwrites every writable column. `Ok(None)` when no row has `id`;
    /// the transaction is rolled back in that case.
    pub async fn update<E: Entity>(&self, id: i64, draft: E::Draft) -> Result<Option<E>> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query(&format!("SELECT id FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut update = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", E::TABLE));
        let mut assignments = update.separated(", ");
        for (column, value) in E::COLUMNS.iter().zip(E::draft_values(&draft)) {
            assignments.push(format!("{} = ", column.name));
            match value {
                SqlValue::Text(text) => assignments.push_bind_unseparated(text),
                SqlValue::Integer(number) => assignments.push_bind_unseparated(number),
            };
        }
        for (column, text) in folded_values::<E>(&draft) {
            assignments.push(format!("{column} = "));
            assignments.push_bind_unseparated(text);
        }
        update.push(" WHERE id = ");
        update.push_bind(id);
        update
            .build()
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to update {} {id}", E::KIND))?;

        tx.commit().await?;
        Ok(Some(E::from_draft(id, draft)))
    }

    /// Returns whether a row was removed.
    pub async fn delete<E: Entity>(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete {} {id}", E::KIND))?;
        Ok(result.rows_affected() > 0)
    }

    /// Unique values of one column, rendered as text, in column order.
    pub async fn distinct_values<E: Entity>(&self, column: &str) -> Result<Vec<String>> {
        let column = E::column(column)
            .ok_or_else(|| CriteriaError::UnknownFilterColumn(column.to_string()))?;
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT CAST({name} AS TEXT) FROM {table} ORDER BY {name} ASC",
            name = column.name,
            table = E::TABLE
        ))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list distinct {}.{}", E::TABLE, column.name))?;
        Ok(rows.iter().map(|row| row.get::<String, _>(0)).collect())
    }
}

fn column_list<E: Entity>() -> String {
    E::COLUMNS
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when the error chain bottoms out in a uniqueness constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(sqlx::Error::as_database_error)
            .is_some_and(|db| db.is_unique_violation())
    })
}

pub fn criteria_error(err: &anyhow::Error) -> Option<&CriteriaError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CriteriaError>())
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Creates the directory a file database lives in. No-op for in-memory URLs.
pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
