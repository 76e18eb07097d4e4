use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

use crate::error::DbError;

/// List every base table outside the system schemas, with its columns.
///
/// Tables are ordered by schema then name; columns by ordinal position.
pub async fn list_tables(pool: &PgPool) -> Result<Value, DbError> {
    let rows = sqlx::query(
        r#"
        select c.table_schema, c.table_name, c.column_name, c.data_type,
               c.is_nullable, c.column_default
        from information_schema.columns c
        join information_schema.tables t
          on t.table_schema = c.table_schema
         and t.table_name = c.table_name
        where t.table_type = 'BASE TABLE'
          and c.table_schema not in ('pg_catalog', 'information_schema')
        order by c.table_schema, c.table_name, c.ordinal_position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut tables: BTreeMap<(String, String), Vec<Value>> = BTreeMap::new();
    for row in rows {
        let table_schema: String = row.try_get("table_schema")?;
        let table_name: String = row.try_get("table_name")?;
        let is_nullable: String = row.try_get("is_nullable")?;
        let column_default: Option<String> = row.try_get("column_default")?;

        tables
            .entry((table_schema, table_name))
            .or_default()
            .push(json!({
                "name": row.try_get::<String, _>("column_name")?,
                "type": row.try_get::<String, _>("data_type")?,
                "nullable": is_nullable == "YES",
                "default": column_default,
            }));
    }

    Ok(tables_json(tables))
}

fn tables_json(tables: BTreeMap<(String, String), Vec<Value>>) -> Value {
    Value::Array(
        tables
            .into_iter()
            .map(|((schema, name), columns)| {
                json!({
                    "schema": schema,
                    "name": name,
                    "columns": columns,
                })
            })
            .collect(),
    )
}
