use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use slacklake_db::IdempotencyRepository;
use slacklake_slack::events::MentionJob;
use slacklake_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use slacklake_slack::{parse_payload, EventsApiPayload, SignatureVerifier};

use crate::worker::Worker;

pub const RETRY_HEADER: &str = "x-slack-retry-num";
const HEALTH_CHECKER_AGENT: &str = "elb-healthchecker";

#[derive(Clone)]
pub struct EventsState {
    pub verifier: SignatureVerifier,
    pub ledger: Arc<dyn IdempotencyRepository>,
    pub event_ttl_secs: u64,
    pub worker: Arc<Worker>,
    pub tasks: Arc<Mutex<JoinSet<()>>>,
}

impl EventsState {
    pub fn new(
        verifier: SignatureVerifier,
        ledger: Arc<dyn IdempotencyRepository>,
        event_ttl_secs: u64,
        worker: Worker,
    ) -> Self {
        Self {
            verifier,
            ledger,
            event_ttl_secs,
            worker: Arc::new(worker),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn spawn_job(&self, job: MentionJob) {
        let worker = self.worker.clone();
        let task = async move { worker.handle(job).await };
        match self.tasks.lock() {
            Ok(mut tasks) => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }

    /// Waits up to `grace` for answers still in flight.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut pending = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return 0,
        };
        let in_flight = pending.len();
        let drained = tokio::time::timeout(grace, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                event_name = "slack.events.drain_timeout",
                in_flight,
                "answers still running at shutdown"
            );
        }
        in_flight
    }
}

pub fn router(state: EventsState) -> Router {
    Router::new().route("/slack/events", post(slack_events)).with_state(state)
}

/// Acknowledges quickly; answering happens on a spawned task.
pub async fn slack_events(
    State(state): State<EventsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let user_agent = header(&headers, "user-agent").unwrap_or_default().to_ascii_lowercase();
    if user_agent.contains(HEALTH_CHECKER_AGENT) {
        return ok();
    }
    if headers.contains_key(RETRY_HEADER) {
        info!(
            event_name = "slack.events.retry_ignored",
            retry_num = header(&headers, RETRY_HEADER).unwrap_or_default(),
            "ignoring Slack retry"
        );
        return ok();
    }

    if let Err(signature_error) = state.verifier.verify(
        header(&headers, TIMESTAMP_HEADER),
        header(&headers, SIGNATURE_HEADER),
        &body,
    ) {
        warn!(
            event_name = "slack.events.signature_rejected",
            error = %signature_error,
            "rejecting unsigned Slack request"
        );
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(parse_error) => {
            warn!(
                event_name = "slack.events.bad_payload",
                error = %parse_error,
                "could not parse Slack payload"
            );
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    let callback = match payload {
        EventsApiPayload::UrlVerification { challenge } => {
            info!(event_name = "slack.events.url_verification", "answering url verification");
            return Json(json!({ "challenge": challenge })).into_response();
        }
        EventsApiPayload::EventCallback(callback) => callback,
        EventsApiPayload::Unsupported => return ok(),
    };

    let Some(job) = MentionJob::from_callback(&callback) else {
        return ok();
    };

    match state.ledger.try_claim_event(&job.event_id, state.event_ttl_secs).await {
        Ok(true) => {}
        Ok(false) => {
            info!(
                event_name = "slack.events.duplicate",
                event_id = %job.event_id,
                "event already claimed"
            );
            return ok();
        }
        Err(ledger_error) => error!(
            event_name = "slack.events.claim_failed",
            event_id = %job.event_id,
            error = %ledger_error,
            "event ledger unavailable; processing without claim"
        ),
    }

    info!(
        event_name = "slack.events.mention_accepted",
        event_id = %job.event_id,
        conversation_key = %job.conversation_key,
        "mention queued"
    );
    state.spawn_job(job);
    ok()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn ok() -> Response {
    (StatusCode::OK, "OK").into_response()
}
