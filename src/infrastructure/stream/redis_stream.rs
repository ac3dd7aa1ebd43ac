//! Thin wrapper over Redis Streams commands (`XADD`/`XREADGROUP`/`XACK`/
//! `XAUTOCLAIM`), used by the Click Publisher (4.E) and Analytics Worker
//! (4.F). Grounded in `redis_cache.rs`'s `ConnectionManager` ownership
//! pattern; issued as raw commands since the `redis` crate's typed stream
//! helpers aren't part of the pinned feature set.

use redis::{RedisResult, Value, aio::ConnectionManager, cmd};
use std::collections::HashMap;

/// One stream entry: its ID plus the flat field/value map it carries.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Clone)]
pub struct RedisStreamClient {
    conn: ConnectionManager,
}

impl RedisStreamClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// `XADD <stream> MAXLEN ~ <cap> * field value [field value ...]`.
    /// Returns the generated entry ID.
    pub async fn publish(&self, stream: &str, fields: &[(&str, &str)], maxlen: Option<usize>) -> RedisResult<String> {
        let mut conn = self.conn.clone();
        let mut c = cmd("XADD");
        c.arg(stream);
        if let Some(n) = maxlen {
            c.arg("MAXLEN").arg("~").arg(n);
        }
        c.arg("*");
        for (k, v) in fields {
            c.arg(*k).arg(*v);
        }
        c.query_async(&mut conn).await
    }

    /// Creates the consumer group at the tail of the stream if absent;
    /// `BUSYGROUP` (already exists) is treated as success.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> =
            cmd("XGROUP").arg("CREATE").arg(stream).arg(group).arg("$").arg("MKSTREAM").query_async(&mut conn).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// `XREADGROUP GROUP <group> <consumer> COUNT <count> BLOCK <block_ms> STREAMS <stream> >`.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> RedisResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: Value = cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;
        Ok(parse_stream_reply(&reply))
    }

    pub async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> RedisResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut c = cmd("XACK");
        c.arg(stream).arg(group);
        for id in ids {
            c.arg(id);
        }
        c.query_async(&mut conn).await
    }

    /// `XAUTOCLAIM <stream> <group> <consumer> <min_idle_ms> 0 COUNT <count>` —
    /// reclaims entries idle past `min_idle_ms`, recovering from a crashed peer.
    pub async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> RedisResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: Value = cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        // XAUTOCLAIM replies [cursor, entries, deleted_ids]; entries is at index 1.
        match &reply {
            Value::Array(parts) if parts.len() >= 2 => Ok(parse_entry_array(&parts[1])),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn len(&self, stream: &str) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        cmd("XLEN").arg(stream).query_async(&mut conn).await
    }
}

/// `XREADGROUP` replies `[[stream_name, [[id, [field, value, ...]], ...]], ...]`
/// (or a Nil array on timeout). We only ever read one stream at a time, so
/// flatten to the entries of the first (only) stream present.
fn parse_stream_reply(v: &Value) -> Vec<StreamEntry> {
    let Value::Array(streams) = v else { return Vec::new() };
    let Some(Value::Array(stream_pair)) = streams.first() else { return Vec::new() };
    let Some(entries) = stream_pair.get(1) else { return Vec::new() };
    parse_entry_array(entries)
}

fn parse_entry_array(v: &Value) -> Vec<StreamEntry> {
    let Value::Array(entries) = v else { return Vec::new() };
    entries.iter().filter_map(parse_entry).collect()
}

fn parse_entry(v: &Value) -> Option<StreamEntry> {
    let Value::Array(parts) = v else { return None };
    let id = bulk_string(parts.first()?)?;
    let mut fields = HashMap::new();
    if let Some(Value::Array(kvs)) = parts.get(1) {
        let mut iter = kvs.iter();
        while let (Some(k), Some(val)) = (iter.next(), iter.next()) {
            if let (Some(k), Some(val)) = (bulk_string(k), bulk_string(val)) {
                fields.insert(k, val);
            }
        }
    }
    Some(StreamEntry { id, fields })
}

fn bulk_string(v: &Value) -> Option<String> {
    match v {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}
