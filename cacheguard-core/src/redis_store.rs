//! [`KvStore`] over a Redis server.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use redis::{Client, Connection, Script};
use tracing::trace;

use crate::error::StoreError;
use crate::store::KvStore;

/// Deletes KEYS[1] only while it still holds ARGV[1].
static COMPARE_AND_DELETE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        else
            return 0
        end
        ",
    )
});

/// A [`KvStore`] talking to Redis over the blocking client.
///
/// Every operation opens a connection from the [`Client`], so a store can be
/// shared freely between threads. Expiries are sent in milliseconds
/// (`PX`/`PEXPIRE`), and lock release runs as a single Lua script.
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// Creates a store for the server at `url`, e.g. `redis://127.0.0.1/`.
    ///
    /// Only the URL is validated here; the first round trip connects.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn connection(&self) -> Result<Connection, StoreError> {
        Ok(self.client.get_connection()?)
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by the server.
    (ttl.as_millis() as u64).max(1)
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection()?;
        Ok(redis::cmd("GET").arg(key).query(&mut con)?)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut con = self.connection()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        cmd.query::<()>(&mut con)?;
        trace!(key = %key, "redis SET");
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query(&mut con)?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.connection()?;
        redis::cmd("DEL").arg(key).query::<()>(&mut con)?;
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection()?;
        Ok(redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query(&mut con)?)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut con = self.connection()?;
        let deleted: i64 = COMPARE_AND_DELETE
            .key(key)
            .arg(expected)
            .invoke(&mut con)?;
        Ok(deleted == 1)
    }
}
