//! SQL Server target through tiberius.
//!
//! Every operation opens its own connection and closes it when done, and
//! every batch runs in its own explicit transaction. Nothing is held open
//! between calls, so a failed statement never leaves shared state behind.

use super::ddl::{self, quote_ident};
use super::{SqlNullType, SqlValue, TargetWriter};
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::source::{IndexInfo, RelationshipInfo, TableSchema};
use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// Parameters per statement, kept under the server's 2100 limit.
const MAX_PARAMS_PER_STATEMENT: usize = 2000;

/// Row value expressions allowed in one INSERT ... VALUES.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server target.
pub struct MssqlTarget {
    config: TargetConfig,
}

impl MssqlTarget {
    /// Create a target for the given server. No connection is opened until first use.
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.application_name("access-mssql-migrate");
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }

    /// Open a fresh connection.
    async fn connect(&self) -> Result<MssqlClient> {
        let config = self.build_config();
        let context = format!(
            "connecting to SQL Server {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        );

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MigrateError::connection(e, &context))?;
        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::connection(e, context))
    }

    /// Drop every foreign key that references `table`.
    async fn drop_referencing_foreign_keys(conn: &mut MssqlClient, table: &str) -> Result<()> {
        let query = r#"SELECT fk.name, OBJECT_SCHEMA_NAME(fk.parent_object_id), OBJECT_NAME(fk.parent_object_id)
               FROM sys.foreign_keys fk
               WHERE fk.referenced_object_id = OBJECT_ID(@P1, 'U')"#;

        let rows = conn
            .query(query, &[&quote_ident(table)])
            .await?
            .into_first_result()
            .await?;

        let constraints: Vec<(String, String, String)> = rows
            .iter()
            .map(|row| {
                (
                    row.get::<&str, _>(0).unwrap_or_default().to_string(),
                    row.get::<&str, _>(1).unwrap_or_default().to_string(),
                    row.get::<&str, _>(2).unwrap_or_default().to_string(),
                )
            })
            .collect();

        for (name, schema, child) in constraints {
            let sql = format!(
                "ALTER TABLE {}.{} DROP CONSTRAINT {}",
                quote_ident(&schema),
                quote_ident(&child),
                quote_ident(&name)
            );
            conn.execute(sql.as_str(), &[]).await?;
            debug!("Dropped foreign key {} on {} (references {})", name, child, table);
        }

        Ok(())
    }

    /// Multi-row parameterized INSERTs, split to respect the parameter and row limits.
    async fn insert_rows(
        conn: &mut MssqlClient,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if columns.is_empty() {
            let sql = ddl::insert_sql(table, columns, 1);
            for _ in rows {
                conn.execute(sql.as_str(), &[]).await?;
            }
            return Ok(rows.len() as u64);
        }

        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / columns.len())
            .clamp(1, MAX_ROWS_PER_STATEMENT);

        let mut total_inserted = 0u64;
        for chunk in rows.chunks(rows_per_statement) {
            let sql = ddl::insert_sql(table, columns, chunk.len());

            let params: Vec<Box<dyn ToSql>> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_sql_param))
                .collect();
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

            conn.execute(sql.as_str(), &param_refs).await?;
            total_inserted += chunk.len() as u64;
        }

        Ok(total_inserted)
    }
}

#[async_trait]
impl TargetWriter for MssqlTarget {
    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing SQL Server connection"))?
            .into_row()
            .await
            .map_err(|e| MigrateError::connection(e, "testing SQL Server connection"))?;

        info!("Connected to SQL Server: {}", self.config.display_string());
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.connect().await?;
        let query = "SELECT CASE WHEN OBJECT_ID(@P1, 'U') IS NULL THEN 0 ELSE 1 END";

        let row = conn
            .query(query, &[&quote_ident(table)])
            .await?
            .into_row()
            .await?;
        Ok(row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(0) == 1)
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut conn = self.connect().await?;
        Self::drop_referencing_foreign_keys(&mut conn, table).await?;

        let sql = format!("DROP TABLE {}", quote_ident(table));
        conn.execute(sql.as_str(), &[]).await?;
        debug!("Dropped table: {}", table);
        Ok(())
    }

    async fn create_table(&self, table: &TableSchema) -> Result<()> {
        let sql = ddl::create_table_sql(table);
        debug!("Creating table {}:\n{}", table.name, sql);

        let mut conn = self.connect().await?;
        conn.execute(sql.as_str(), &[]).await?;
        Ok(())
    }

    async fn write_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect().await?;
        conn.execute("BEGIN TRANSACTION", &[]).await.map_err(|e| {
            MigrateError::transfer(table, format!("begin transaction: {}", e))
        })?;

        match Self::insert_rows(&mut conn, table, columns, &rows).await {
            Ok(inserted) => {
                conn.execute("COMMIT TRANSACTION", &[]).await.map_err(|e| {
                    MigrateError::transfer(table, format!("commit transaction: {}", e))
                })?;
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback_err) = conn.execute("ROLLBACK TRANSACTION", &[]).await {
                    warn!("Failed to roll back batch for {}: {}", table, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn create_index(&self, index: &IndexInfo) -> Result<()> {
        let Some(sql) = ddl::create_index_sql(index) else {
            return Ok(());
        };

        let mut conn = self.connect().await?;
        conn.execute(sql.as_str(), &[]).await?;
        debug!("Created index {} on {}", index.name, index.table);
        Ok(())
    }

    async fn create_foreign_key(&self, rel: &RelationshipInfo) -> Result<()> {
        let sql = ddl::foreign_key_sql(rel);

        let mut conn = self.connect().await?;
        conn.execute(sql.as_str(), &[]).await?;
        debug!("Created foreign key {} on {}", rel.constraint_name(), rel.child_table);
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mssql"
    }
}

/// Convert SqlValue to a boxed ToSql trait object for parameterized queries.
///
/// NULLs carry the column's type so the server never has to convert an
/// `nvarchar` NULL into, for example, `varbinary`.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Bool => Box::new(Option::<bool>::None),
            SqlNullType::I64 => Box::new(Option::<i64>::None),
            SqlNullType::F64 => Box::new(Option::<f64>::None),
            SqlNullType::Decimal => Box::new(Option::<rust_decimal::Decimal>::None),
            SqlNullType::String => Box::new(Option::<String>::None),
            SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
            SqlNullType::Uuid => Box::new(Option::<uuid::Uuid>::None),
            SqlNullType::DateTime => Box::new(Option::<chrono::NaiveDateTime>::None),
        },
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F64(f) => {
            if f.is_finite() {
                Box::new(*f)
            } else {
                // MSSQL doesn't support NaN/Infinity
                Box::new(Option::<f64>::None)
            }
        }
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::DateTime(dt) => Box::new(*dt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_config(encrypt: bool) -> TargetConfig {
        TargetConfig {
            host: "sql01".into(),
            port: 14330,
            database: "Northwind".into(),
            user: "migrator".into(),
            password: "secret".into(),
            encrypt,
            trust_server_cert: true,
        }
    }

    #[test]
    fn test_build_config_address() {
        let target = MssqlTarget::new(&target_config(false));
        let config = target.build_config();
        assert_eq!(config.get_addr(), "sql01:14330");
        assert_eq!(target.db_type(), "mssql");
    }

    #[test]
    fn test_null_params_are_typed() {
        // Every NULL type converts without panicking.
        for null_type in [
            SqlNullType::Bool,
            SqlNullType::I64,
            SqlNullType::F64,
            SqlNullType::Decimal,
            SqlNullType::String,
            SqlNullType::Bytes,
            SqlNullType::Uuid,
            SqlNullType::DateTime,
        ] {
            let _ = sql_value_to_sql_param(&SqlValue::Null(null_type));
        }
        let _ = sql_value_to_sql_param(&SqlValue::F64(f64::NAN));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let mut config = target_config(false);
        config.host = "127.0.0.1".into();
        config.port = 1;
        let target = MssqlTarget::new(&config);

        let err = target.test_connection().await.unwrap_err();
        assert!(matches!(err, MigrateError::Connection { .. }));
    }
}
