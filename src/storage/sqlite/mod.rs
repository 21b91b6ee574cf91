#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

pub(crate) mod migration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio_rusqlite::{Connection, OpenFlags, named_params, params};

use crate::storage::KeyValueStore;

use migration::MIGRATION;

pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )
            .await
            .wrap_err(format!("opening database path: {}", path))?,
            None => Connection::open_in_memory()
                .await
                .wrap_err("opening in-memory database")?,
        };

        let ret = Self { conn };
        ret.run_migration().await.wrap_err("running migration")?;
        Ok(ret)
    }

    async fn run_migration(&self) -> Result<()> {
        self.conn
            .call(|conn| Ok(conn.execute_batch(MIGRATION)?))
            .await
            .wrap_err("executing migration")?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for Sqlite {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?")?;
                let mut rows = stmt.query(params![key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, String>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .wrap_err("reading key")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let updated_at = chrono::Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO kv_store (key, value, updated_at)
                VALUES (:key, :value, :updated_at)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                    named_params! {
                        ":key": key,
                        ":value": value,
                        ":updated_at": updated_at,
                    },
                )?;
                Ok(())
            })
            .await
            .wrap_err("writing key")?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
                Ok(())
            })
            .await
            .wrap_err("removing key")?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        let keys = self
            .conn
            .call(move |conn| {
                // substr keeps `_` and `%` in the prefix literal, unlike LIKE
                let mut stmt = conn.prepare(
                    "SELECT key FROM kv_store WHERE substr(key, 1, length(:prefix)) = :prefix ORDER BY key",
                )?;
                let mut rows = stmt.query(named_params! { ":prefix": prefix })?;
                let mut keys = vec![];
                while let Some(row) = rows.next()? {
                    keys.push(row.get::<_, String>(0)?);
                }
                Ok(keys)
            })
            .await
            .wrap_err("listing keys")?;
        Ok(keys)
    }
}
