//! Webhook Dispatcher (component H): claims due deliveries under a
//! skip-locked acquisition, signs and POSTs each one with bounded
//! concurrency, and applies the attempt outcome back to the store.
//!
//! The claim/sign/send/drain-results architecture is grounded in
//! `other_examples/9197b7f6_doublewordai-control-layer__dwctl-src-webhooks-dispatcher.rs.rs`:
//! a dedicated sender task owns the `reqwest::Client` and a [`Semaphore`]
//! capping concurrent in-flight sends, decoupled from the claim loop by an
//! `mpsc` channel in each direction so a slow or backed-up endpoint can
//! never stall the next DB claim.

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::signer;
use crate::domain::entities::{AttemptOutcome, DeliveryStatus, WebhookDelivery};
use crate::domain::repositories::{WebhookDeliveryStore, WebhookEndpointStore};

const SIGNATURE_HEADER: &str = "x-penshort-signature";
const TIMESTAMP_HEADER: &str = "x-penshort-timestamp";
const DELIVERY_ID_HEADER: &str = "x-penshort-delivery-id";
const USER_AGENT_VALUE: &str = "Penshort-Webhook/1.0";

pub struct WebhookDispatcherConfig {
    pub claim_batch_size: i64,
    pub claim_interval: StdDuration,
    pub max_concurrent_sends: usize,
    pub connect_timeout: StdDuration,
    pub total_timeout: StdDuration,
}

impl Default for WebhookDispatcherConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 50,
            claim_interval: StdDuration::from_secs(5),
            max_concurrent_sends: 16,
            // Budget: total 30s (dial 10s, TLS 10s, response headers 15s);
            // reqwest exposes an overall timeout and a connect timeout, not
            // a separate TLS/header-wait knob.
            connect_timeout: StdDuration::from_secs(10),
            total_timeout: StdDuration::from_secs(30),
        }
    }
}

/// attempt #1→1m, #2→5m, #3→30m, #4→2h, #5→12h, ±20% jitter. Takes the RNG
/// as a parameter so tests can pass a seeded PRNG and assert exact bounds;
/// production passes the thread-local generator.
pub fn retry_delay(attempt_count: i32, rng: &mut impl Rng) -> chrono::Duration {
    let base_secs: i64 = match attempt_count {
        1 => 60,
        2 => 5 * 60,
        3 => 30 * 60,
        4 => 2 * 60 * 60,
        _ => 12 * 60 * 60,
    };
    let jitter_frac: f64 = rng.random_range(-0.2..=0.2);
    let jittered = (base_secs as f64) * (1.0 + jitter_frac);
    chrono::Duration::seconds(jittered.round().max(1.0) as i64)
}

struct SendJob {
    delivery: WebhookDelivery,
    target_url: String,
    secret_hash: String,
}

struct SendResult {
    delivery: WebhookDelivery,
    outcome: AttemptOutcome,
}

pub struct WebhookDispatcher {
    deliveries: Arc<dyn WebhookDeliveryStore>,
    endpoints: Arc<dyn WebhookEndpointStore>,
    http: reqwest::Client,
    config: WebhookDispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(
        deliveries: Arc<dyn WebhookDeliveryStore>,
        endpoints: Arc<dyn WebhookEndpointStore>,
        config: WebhookDispatcherConfig,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.total_timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { deliveries, endpoints, http, config })
    }

    /// Runs the claim/send/apply loop until `shutdown` fires. In-flight
    /// sends are allowed to complete; no new deliveries are claimed once
    /// cancellation is observed.
    pub async fn run(self, shutdown: CancellationToken) {
        let (send_tx, send_rx) = mpsc::channel::<SendJob>(256);
        let (result_tx, mut result_rx) = mpsc::channel::<SendResult>(256);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sends));

        let sender_task = tokio::spawn(run_sender(send_rx, result_tx, self.http.clone(), semaphore, shutdown.clone()));

        let mut ticker = tokio::time::interval(self.config.claim_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("webhook dispatcher started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.claim_and_send(&send_tx).await,
                Some(result) = result_rx.recv() => self.apply_result(result).await,
                _ = shutdown.cancelled() => break,
            }
        }

        drop(send_tx);
        let _ = sender_task.await;
        while let Ok(result) = result_rx.try_recv() {
            self.apply_result(result).await;
        }
        tracing::info!("webhook dispatcher stopped");
    }

    async fn claim_and_send(&self, send_tx: &mpsc::Sender<SendJob>) {
        let now = Utc::now();
        let claimed = match self.deliveries.claim_due(self.config.claim_batch_size, now).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to claim due webhook deliveries");
                return;
            }
        };
        if claimed.is_empty() {
            return;
        }
        metrics::gauge!("penshort_webhook_queue_depth").set(claimed.len() as f64);

        for delivery in claimed {
            let endpoint = match self.endpoints.get_by_id(delivery.endpoint_id).await {
                Ok(Some(e)) => e,
                Ok(None) => {
                    self.mark_exhausted(delivery, "endpoint deleted").await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, delivery_id = delivery.id, "failed to load endpoint for delivery");
                    continue;
                }
            };
            if !endpoint.is_active() {
                self.mark_exhausted(delivery, "endpoint disabled").await;
                continue;
            }

            let job = SendJob { delivery, target_url: endpoint.target_url, secret_hash: endpoint.secret_hash };
            if send_tx.try_send(job).is_err() {
                tracing::warn!("webhook sender channel full, delivery remains pending for the next claim cycle");
            }
        }
    }

    /// Endpoint deletion/disable stops further retries for this delivery
    /// without consuming an HTTP attempt.
    async fn mark_exhausted(&self, mut delivery: WebhookDelivery, reason: &str) {
        delivery.status = DeliveryStatus::Exhausted;
        delivery.last_error = Some(reason.to_string());
        delivery.updated_at = Utc::now();
        if let Err(e) = self.deliveries.save(&delivery).await {
            tracing::error!(error = %e, delivery_id = delivery.id, "failed to persist exhausted delivery");
        }
    }

    async fn apply_result(&self, result: SendResult) {
        let SendResult { mut delivery, outcome } = result;
        let status_label = match &outcome {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure { .. } => "failure",
        };
        let now = Utc::now();
        delivery.apply_attempt(outcome, now, |attempt| retry_delay(attempt, &mut rand::rng()));
        metrics::counter!("penshort_webhook_deliveries_total", "status" => status_label).increment(1);
        if let Err(e) = self.deliveries.save(&delivery).await {
            tracing::error!(error = %e, delivery_id = delivery.id, "failed to persist webhook delivery attempt outcome");
        }
    }
}

/// Owns the HTTP client and the concurrency semaphore; pulls jobs off
/// `send_rx` and spawns one bounded task per send so a slow peer only holds
/// up its own permit, never the claim loop.
async fn run_sender(
    mut send_rx: mpsc::Receiver<SendJob>,
    result_tx: mpsc::Sender<SendResult>,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_job = send_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let http = http.clone();
                let result_tx = result_tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = send_one(&http, &job).await;
                    let _ = result_tx.send(SendResult { delivery: job.delivery, outcome }).await;
                });
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn send_one(http: &reqwest::Client, job: &SendJob) -> AttemptOutcome {
    let timestamp = Utc::now().timestamp();
    let signature = signer::sign(&job.secret_hash, timestamp, &job.delivery.payload_json);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    if let Ok(v) = HeaderValue::from_str(&signature) {
        headers.insert(HeaderName::from_static(SIGNATURE_HEADER), v);
    }
    if let Ok(v) = HeaderValue::from_str(&timestamp.to_string()) {
        headers.insert(HeaderName::from_static(TIMESTAMP_HEADER), v);
    }
    if let Ok(v) = HeaderValue::from_str(&job.delivery.id.to_string()) {
        headers.insert(HeaderName::from_static(DELIVERY_ID_HEADER), v);
    }

    let response = http.post(&job.target_url).headers(headers).body(job.delivery.payload_json.clone()).send().await;

    match response {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                AttemptOutcome::Success
            } else {
                let body = resp.text().await.unwrap_or_default();
                AttemptOutcome::Failure { http_status: Some(status.as_u16() as i32), error: format!("HTTP {}: {body}", status.as_u16()) }
            }
        }
        Err(e) => AttemptOutcome::Failure { http_status: None, error: e.to_string() },
    }
}
