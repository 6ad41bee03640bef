//! MySQL and PostgreSQL handles backed by sqlx pools

use async_trait::async_trait;
use bson::{Binary, Bson, Document};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use url::Url;

use super::{
    ColumnInfo, DatabaseHandle, DatabaseKind, Dialect, DriverError, DriverResult, Filter,
    SqlHandle,
};

const MAX_CONNECTIONS: u32 = 5;

/// Bind one BSON value with the closest native SQL type.
macro_rules! bind_value {
    ($query:expr, $value:expr) => {
        match $value {
            Bson::Null | Bson::Undefined => $query.bind(None::<String>),
            Bson::Boolean(v) => $query.bind(v),
            Bson::Int32(v) => $query.bind(v),
            Bson::Int64(v) => $query.bind(v),
            Bson::Double(v) => $query.bind(v),
            Bson::String(v) => $query.bind(v),
            Bson::DateTime(v) => $query.bind(DateTime::<Utc>::from_timestamp_millis(v.timestamp_millis())),
            Bson::Binary(v) => $query.bind(v.bytes),
            other => $query.bind(other.into_relaxed_extjson().to_string()),
        }
    };
}

/// Decode a column into BSON, trying typed decoders by the column's
/// declared type before falling back to text and then raw bytes.
macro_rules! column_value {
    ($row:expr, $index:expr, { $($name:pat => $ty:ty => $convert:expr),* $(,)? }) => {{
        let row = $row;
        let index = $index;
        let type_name = row.column(index).type_info().name().to_uppercase();
        let typed: Option<Bson> = match type_name.as_str() {
            $(
                $name => match row.try_get::<Option<$ty>, _>(index) {
                    Ok(Some(v)) => Some($convert(v)),
                    Ok(None) => Some(Bson::Null),
                    Err(_) => None,
                },
            )*
            _ => None,
        };
        typed.unwrap_or_else(|| match row.try_get_unchecked::<Option<String>, _>(index) {
            Ok(Some(text)) => Bson::String(text),
            Ok(None) => Bson::Null,
            Err(_) => match row.try_get_unchecked::<Option<Vec<u8>>, _>(index) {
                Ok(Some(bytes)) => generic_binary(bytes),
                _ => Bson::Null,
            },
        })
    }};
}

/// One pooled SQL connection per session.
pub enum SqlConnection {
    MySql(MySqlPool),
    Postgres(PgPool),
}

impl SqlConnection {
    pub async fn connect(dialect: Dialect, url: &Url) -> DriverResult<Self> {
        let connection = match dialect {
            Dialect::MySql => SqlConnection::MySql(
                MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_with(mysql_options(url)?)
                    .await?,
            ),
            Dialect::Postgres => SqlConnection::Postgres(
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_with(pg_options(url)?)
                    .await?,
            ),
        };
        tracing::debug!("Opened {:?} pool for {}", dialect, url.host_str().unwrap_or(""));
        Ok(connection)
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            SqlConnection::MySql(_) => Dialect::MySql,
            SqlConnection::Postgres(_) => Dialect::Postgres,
        }
    }

    async fn strings(&self, mysql: &str, postgres: &str, bind: Option<&str>) -> DriverResult<Vec<String>> {
        let names = match self {
            SqlConnection::MySql(pool) => {
                let mut query = sqlx::query_scalar::<_, String>(mysql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query.fetch_all(pool).await?
            }
            SqlConnection::Postgres(pool) => {
                let mut query = sqlx::query_scalar::<_, String>(postgres);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query.fetch_all(pool).await?
            }
        };
        Ok(names)
    }

    async fn run(&self, sql: &str, params: Vec<Bson>) -> DriverResult<u64> {
        let affected = match self {
            SqlConnection::MySql(pool) => {
                let mut query = sqlx::query(sql);
                for value in params {
                    query = bind_value!(query, value);
                }
                query.execute(pool).await?.rows_affected()
            }
            SqlConnection::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for value in params {
                    query = bind_value!(query, value);
                }
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

/// Connection options from the URL, including `ssl-mode` / `ssl-ca` query options.
fn mysql_options(url: &Url) -> DriverResult<MySqlConnectOptions> {
    Ok(MySqlConnectOptions::from_str(url.as_str())?)
}

/// Connection options from the URL, including `sslmode` / `sslrootcert` query options.
fn pg_options(url: &Url) -> DriverResult<PgConnectOptions> {
    Ok(PgConnectOptions::from_str(url.as_str())?)
}

fn generic_binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: bson::spec::BinarySubtype::Generic,
        bytes,
    })
}

fn from_utc(value: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(value.timestamp_millis()))
}

fn from_naive(value: NaiveDateTime) -> Bson {
    from_utc(value.and_utc())
}

fn from_date(value: NaiveDate) -> Bson {
    from_naive(value.and_time(NaiveTime::MIN))
}

fn from_unsigned(value: u64) -> Bson {
    i64::try_from(value)
        .map(Bson::Int64)
        .unwrap_or(Bson::Double(value as f64))
}

fn mysql_value(row: &MySqlRow, index: usize) -> Bson {
    column_value!(row, index, {
        "BOOLEAN" => bool => Bson::Boolean,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" => i32 => Bson::Int32,
        "BIGINT" => i64 => Bson::Int64,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => u64 => from_unsigned,
        "FLOAT" => f32 => |v: f32| Bson::Double(v.into()),
        "DOUBLE" => f64 => Bson::Double,
        "TIMESTAMP" => DateTime<Utc> => from_utc,
        "DATETIME" => NaiveDateTime => from_naive,
        "DATE" => NaiveDate => from_date,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => Vec<u8> => generic_binary,
    })
}

fn pg_value(row: &PgRow, index: usize) -> Bson {
    column_value!(row, index, {
        "BOOL" => bool => Bson::Boolean,
        "INT2" => i16 => |v: i16| Bson::Int32(v.into()),
        "INT4" => i32 => Bson::Int32,
        "INT8" => i64 => Bson::Int64,
        "FLOAT4" => f32 => |v: f32| Bson::Double(v.into()),
        "FLOAT8" => f64 => Bson::Double,
        "TIMESTAMPTZ" => DateTime<Utc> => from_utc,
        "TIMESTAMP" => NaiveDateTime => from_naive,
        "DATE" => NaiveDate => from_date,
        "BYTEA" => Vec<u8> => generic_binary,
    })
}

fn mysql_row(row: &MySqlRow) -> Document {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), mysql_value(row, column.ordinal())))
        .collect()
}

fn pg_row(row: &PgRow) -> Document {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), pg_value(row, column.ordinal())))
        .collect()
}

#[async_trait]
impl DatabaseHandle for SqlConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sql
    }

    async fn databases(&self) -> DriverResult<Vec<String>> {
        self.strings(
            "SELECT CAST(schema_name AS CHAR) FROM information_schema.schemata ORDER BY schema_name",
            "SELECT datname::text FROM pg_database WHERE NOT datistemplate ORDER BY datname",
            None,
        )
        .await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> DriverResult<u64> {
        let dialect = self.dialect();
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            dialect.quote(table),
            filter.to_sql(dialect, &mut params)
        );
        tracing::debug!("{}", sql);
        self.run(&sql, params).await
    }

    async fn update_one(&self, table: &str, filter: &Filter, update: &Document) -> DriverResult<u64> {
        let dialect = self.dialect();
        let table = dialect.quote(table);
        let mut params = Vec::new();
        let assignments = update
            .iter()
            .map(|(column, value)| {
                let column = dialect.quote(column);
                format!("{} = {}", column, dialect.placeholder(&mut params, value.clone()))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let condition = filter.to_sql(dialect, &mut params);

        let sql = match dialect {
            Dialect::MySql => format!("UPDATE {} SET {} WHERE {} LIMIT 1", table, assignments, condition),
            Dialect::Postgres => format!(
                "UPDATE {table} SET {assignments} WHERE ctid = (SELECT ctid FROM {table} WHERE {condition} LIMIT 1)",
            ),
        };
        tracing::debug!("{}", sql);
        self.run(&sql, params).await
    }

    async fn close(&self) -> DriverResult<()> {
        match self {
            SqlConnection::MySql(pool) => pool.close().await,
            SqlConnection::Postgres(pool) => pool.close().await,
        }
        Ok(())
    }

    fn as_sql(&self) -> Option<&dyn SqlHandle> {
        Some(self)
    }
}

#[async_trait]
impl SqlHandle for SqlConnection {
    async fn tables(&self) -> DriverResult<Vec<String>> {
        self.strings(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name",
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name",
            None,
        )
        .await
    }

    async fn views(&self) -> DriverResult<Vec<String>> {
        self.strings(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.views \
             WHERE table_schema = DATABASE() ORDER BY table_name",
            "SELECT table_name::text FROM information_schema.views \
             WHERE table_schema = current_schema() ORDER BY table_name",
            None,
        )
        .await
    }

    async fn materialized_views(&self) -> DriverResult<Vec<String>> {
        match self {
            SqlConnection::MySql(_) => Err(DriverError::Unsupported),
            SqlConnection::Postgres(pool) => Ok(sqlx::query_scalar::<_, String>(
                "SELECT matviewname::text FROM pg_matviews \
                 WHERE schemaname = current_schema() ORDER BY matviewname",
            )
            .fetch_all(pool)
            .await?),
        }
    }

    async fn columns(&self, table: &str) -> DriverResult<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String)> = match self {
            SqlConnection::MySql(pool) => {
                sqlx::query_as(
                    "SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR), CAST(is_nullable AS CHAR) \
                     FROM information_schema.columns \
                     WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(pool)
                .await?
            }
            SqlConnection::Postgres(pool) => {
                sqlx::query_as(
                    "SELECT column_name::text, data_type::text, is_nullable::text \
                     FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable)| ColumnInfo {
                name,
                data_type,
                is_optional: nullable.eq_ignore_ascii_case("YES"),
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> DriverResult<Vec<String>> {
        self.strings(
            "SELECT CAST(column_name AS CHAR) FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position",
            "SELECT k.column_name::text FROM information_schema.table_constraints c \
             JOIN information_schema.key_column_usage k \
               ON k.constraint_name = c.constraint_name AND k.table_schema = c.table_schema \
             WHERE c.constraint_type = 'PRIMARY KEY' AND c.table_schema = current_schema() \
               AND c.table_name = $1 ORDER BY k.ordinal_position",
            Some(table),
        )
        .await
    }

    async fn execute(&self, sql: &str) -> DriverResult<Vec<Document>> {
        let rows: Vec<Document> = match self {
            SqlConnection::MySql(pool) => sqlx::raw_sql(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(mysql_row)
                .collect(),
            SqlConnection::Postgres(pool) => sqlx::raw_sql(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(pg_row)
                .collect(),
        };
        Ok(rows)
    }
}
