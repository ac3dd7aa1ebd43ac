//! The `WebhookDelivery` entity and its retry state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    Exhausted,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "success" => Some(DeliveryStatus::Success),
            "failed" => Some(DeliveryStatus::Failed),
            "exhausted" => Some(DeliveryStatus::Exhausted),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Exhausted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: i64,
    pub endpoint_id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload_json: Vec<u8>,
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct NewWebhookDelivery {
    pub endpoint_id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload_json: Vec<u8>,
    pub max_attempts: i32,
}

/// Outcome of one HTTP attempt, reported by the dispatcher's send/classify
/// step and applied to a delivery's retry state.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success,
    Failure { http_status: Option<i32>, error: String },
}

impl WebhookDelivery {
    /// Applies a single attempt outcome in place, advancing `attempt_count`
    /// and, on failure, either scheduling the next retry or exhausting the
    /// delivery. `next_retry_delay` supplies the jittered backoff duration
    /// for the *post-increment* attempt number.
    pub fn apply_attempt(
        &mut self,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
        next_retry_delay: impl Fn(i32) -> chrono::Duration,
    ) {
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.updated_at = now;

        match outcome {
            AttemptOutcome::Success => {
                self.status = DeliveryStatus::Success;
                self.last_http_status = Some(200);
                self.last_error = None;
            }
            AttemptOutcome::Failure { http_status, error } => {
                self.last_http_status = http_status;
                self.last_error = Some(truncate(&error, MAX_ERROR_LEN));
                if self.attempt_count >= self.max_attempts {
                    self.status = DeliveryStatus::Exhausted;
                } else {
                    self.status = DeliveryStatus::Failed;
                    self.next_retry_at = now + next_retry_delay(self.attempt_count);
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> WebhookDelivery {
        let now = Utc::now();
        WebhookDelivery {
            id: 1,
            endpoint_id: 1,
            event_id: Uuid::new_v4(),
            event_type: "click".into(),
            payload_json: b"{}".to_vec(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_retry_at: now,
            last_attempt_at: None,
            last_http_status: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn success_marks_terminal() {
        let mut d = delivery();
        d.apply_attempt(AttemptOutcome::Success, Utc::now(), |_| chrono::Duration::zero());
        assert_eq!(d.status, DeliveryStatus::Success);
        assert_eq!(d.attempt_count, 1);
        assert!(d.status.is_terminal());
    }

    #[test]
    fn failure_before_max_attempts_schedules_retry() {
        let mut d = delivery();
        let now = Utc::now();
        d.apply_attempt(
            AttemptOutcome::Failure { http_status: Some(503), error: "bad gateway".into() },
            now,
            |_| chrono::Duration::minutes(1),
        );
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.attempt_count, 1);
        assert_eq!(d.next_retry_at, now + chrono::Duration::minutes(1));
        assert!(!d.status.is_terminal());
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut d = delivery();
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            d.apply_attempt(
                AttemptOutcome::Failure { http_status: Some(500), error: "err".into() },
                Utc::now(),
                |_| chrono::Duration::minutes(1),
            );
        }
        assert_eq!(d.status, DeliveryStatus::Exhausted);
        assert_eq!(d.attempt_count, DEFAULT_MAX_ATTEMPTS);
        assert!(d.status.is_terminal());
    }

    #[test]
    fn attempt_count_strictly_increases() {
        let mut d = delivery();
        let mut last = d.attempt_count;
        for _ in 0..3 {
            d.apply_attempt(
                AttemptOutcome::Failure { http_status: Some(500), error: "e".into() },
                Utc::now(),
                |_| chrono::Duration::minutes(1),
            );
            assert!(d.attempt_count > last);
            last = d.attempt_count;
        }
    }

    #[test]
    fn error_is_truncated_to_500_chars() {
        let mut d = delivery();
        let long_error = "x".repeat(1000);
        d.apply_attempt(
            AttemptOutcome::Failure { http_status: Some(500), error: long_error },
            Utc::now(),
            |_| chrono::Duration::minutes(1),
        );
        assert_eq!(d.last_error.unwrap().chars().count(), 500);
    }
}
