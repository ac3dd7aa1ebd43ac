//! Redis Streams transport for the click-event pipeline (components E/F).

mod redis_stream;

pub use redis_stream::{RedisStreamClient, StreamEntry};

/// Stream and consumer-group names shared by the click publisher and the
/// analytics worker.
pub const CLICK_EVENTS_STREAM: &str = "stream:click_events";
pub const CLICK_EVENTS_DLQ_STREAM: &str = "stream:click_events:dlq";
pub const ANALYTICS_CONSUMER_GROUP: &str = "analytics_workers";
