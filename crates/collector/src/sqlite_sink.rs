use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, AsArray, RecordBatch},
    datatypes::{DataType, Float64Type, Int64Type, Schema},
};
use clima_core::ensure_parent_dir;
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row, Sqlite,
};
use std::{path::Path, time::Duration};

use crate::read_partition;

/// Appends every row of the parquet file at `local_path` to `table_name` in
/// the SQLite database at `database_path`. The database, its folder, the
/// table and any columns it lacks are created on demand. Returns the number
/// of rows appended.
pub async fn append_partition(
    local_path: &Path,
    database_path: &Path,
    table_name: &str,
) -> Result<u64> {
    let batches = read_partition(local_path)?;
    let Some(schema) = batches.first().map(|b| b.schema()) else {
        return Ok(0);
    };

    let pool = connect(database_path).await?;
    let result = append_batches(&pool, table_name, &schema, &batches).await;
    pool.close().await;
    result
}

async fn connect(database_path: &Path) -> Result<SqlitePool> {
    ensure_parent_dir(database_path)
        .with_context(|| format!("Failed to create database directory for {database_path:?}"))?;

    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .pragma("journal_mode", "WAL")
        .pragma("busy_timeout", "5000");

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .context("Failed to open sqlite database")
}

async fn append_batches(
    pool: &SqlitePool,
    table_name: &str,
    schema: &Schema,
    batches: &[RecordBatch],
) -> Result<u64> {
    let table = quote(table_name);
    let columns: Vec<(String, &'static str)> = schema
        .fields()
        .iter()
        .map(|f| Ok((f.name().clone(), sql_type(f.data_type())?)))
        .collect::<Result<_>>()?;

    let mut tx = pool.begin().await?;

    let definitions: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote(name), ty))
        .collect();
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        definitions.join(", ")
    ))
    .execute(&mut *tx)
    .await?;

    let existing: Vec<String> = sqlx::query("SELECT name FROM pragma_table_info(?)")
        .bind(table_name)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()?;
    for (name, ty) in &columns {
        if !existing.iter().any(|e| e == name) {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table,
                quote(name),
                ty
            ))
            .execute(&mut *tx)
            .await?;
        }
    }

    let names: Vec<String> = columns.iter().map(|(name, _)| quote(name)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(", "),
        placeholders
    );

    let mut appended = 0;
    for batch in batches {
        for row in 0..batch.num_rows() {
            let mut query = sqlx::query(&insert);
            for column in batch.columns() {
                query = bind_value(query, column.as_ref(), row)?;
            }
            appended += query.execute(&mut *tx).await?.rows_affected();
        }
    }

    tx.commit().await?;
    Ok(appended)
}

fn sql_type(data_type: &DataType) -> Result<&'static str> {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => Ok("TEXT"),
        DataType::Float64 => Ok("REAL"),
        DataType::Int64 => Ok("INTEGER"),
        other => Err(anyhow!("unsupported column type for sqlite: {}", other)),
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    column: &dyn Array,
    row: usize,
) -> Result<Query<'q, Sqlite, SqliteArguments<'q>>> {
    let query = match column.data_type() {
        DataType::Utf8 => {
            let values = column.as_string::<i32>();
            query.bind((!values.is_null(row)).then(|| values.value(row).to_string()))
        }
        DataType::LargeUtf8 => {
            let values = column.as_string::<i64>();
            query.bind((!values.is_null(row)).then(|| values.value(row).to_string()))
        }
        DataType::Float64 => {
            let values = column.as_primitive::<Float64Type>();
            query.bind((!values.is_null(row)).then(|| values.value(row)))
        }
        DataType::Int64 => {
            let values = column.as_primitive::<Int64Type>();
            query.bind((!values.is_null(row)).then(|| values.value(row)))
        }
        other => return Err(anyhow!("unsupported column type for sqlite: {}", other)),
    };
    Ok(query)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
