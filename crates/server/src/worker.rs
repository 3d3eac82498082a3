use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use slacklake_agent::{AgentRuntime, Answer};
use slacklake_db::{EventState, EventUpdate, IdempotencyRepository};
use slacklake_slack::events::MentionJob;
use slacklake_slack::{messages, SlackWebClient};

#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<Answer>;
}

#[async_trait]
impl QuestionAnswerer for AgentRuntime {
    async fn answer(&self, question: &str) -> Result<Answer> {
        AgentRuntime::answer(self, question).await
    }
}

/// Answers one mention in its Slack thread and records the outcome in the
/// event ledger.
pub struct Worker {
    answerer: Arc<dyn QuestionAnswerer>,
    slack: Arc<dyn SlackWebClient>,
    ledger: Arc<dyn IdempotencyRepository>,
}

impl Worker {
    pub fn new(
        answerer: Arc<dyn QuestionAnswerer>,
        slack: Arc<dyn SlackWebClient>,
        ledger: Arc<dyn IdempotencyRepository>,
    ) -> Self {
        Self { answerer, slack, ledger }
    }

    /// Never fails: every error ends as a thread message plus a FAILED
    /// ledger state.
    pub async fn handle(&self, job: MentionJob) {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "worker.job.start",
            correlation_id = %correlation_id,
            event_id = %job.event_id,
            conversation_key = %job.conversation_key,
            "handling mention"
        );

        let state = match self.ledger.is_done(&job.event_id).await {
            Ok((true, _)) => {
                info!(
                    event_name = "worker.job.duplicate",
                    correlation_id = %correlation_id,
                    event_id = %job.event_id,
                    "event already answered; skipping"
                );
                return;
            }
            Ok((false, state)) => state,
            Err(ledger_error) => {
                warn!(
                    event_name = "worker.ledger.unavailable",
                    correlation_id = %correlation_id,
                    error = %ledger_error,
                    "event ledger unavailable; answering anyway"
                );
                None
            }
        };

        let mut processing_ts = state.and_then(|record| record.processing_message_ts);
        match self.process(&job, &mut processing_ts).await {
            Ok(()) => {
                self.record(&job.event_id, EventUpdate::status(EventState::Done)).await;
                info!(
                    event_name = "worker.job.done",
                    correlation_id = %correlation_id,
                    event_id = %job.event_id,
                    "mention answered"
                );
            }
            Err(job_error) => {
                error!(
                    event_name = "worker.job.failed",
                    correlation_id = %correlation_id,
                    event_id = %job.event_id,
                    error = %job_error,
                    "mention failed"
                );
                self.report_failure(&job, processing_ts.as_deref(), &job_error.to_string()).await;
                self.record(&job.event_id, EventUpdate::failed(job_error.to_string())).await;
            }
        }
    }

    async fn process(&self, job: &MentionJob, processing_ts: &mut Option<String>) -> Result<()> {
        if job.question.is_empty() {
            self.slack
                .post_message(&job.channel, Some(&job.reply_thread_ts), &messages::greeting(&job.user))
                .await?;
            return Ok(());
        }

        self.record(&job.event_id, EventUpdate::status(EventState::Processing)).await;

        let message_ts = match processing_ts.clone() {
            Some(ts) => ts,
            None => {
                let posted = self
                    .slack
                    .post_message(
                        &job.channel,
                        Some(&job.reply_thread_ts),
                        &messages::processing(&job.user),
                    )
                    .await?;
                *processing_ts = Some(posted.ts.clone());
                self.record(&job.event_id, EventUpdate::processing_message(posted.ts.clone())).await;
                posted.ts
            }
        };

        let answer = self.answerer.answer(&job.question).await?;
        self.slack.update_message(&job.channel, &message_ts, &answer.text).await?;

        if let Some(sql) = &answer.sql {
            self.slack
                .post_message(&job.channel, Some(&job.reply_thread_ts), &messages::sql_debug(sql))
                .await?;
        }
        Ok(())
    }

    async fn report_failure(&self, job: &MentionJob, processing_ts: Option<&str>, detail: &str) {
        let text = messages::failure(detail);
        let delivered = match processing_ts {
            Some(ts) => self.slack.update_message(&job.channel, ts, &text).await,
            None => self
                .slack
                .post_message(&job.channel, Some(&job.reply_thread_ts), &text)
                .await
                .map(|_| ()),
        };
        if let Err(slack_error) = delivered {
            warn!(
                event_name = "worker.failure_report.failed",
                event_id = %job.event_id,
                error = %slack_error,
                "could not tell the user about the failure"
            );
        }
    }

    async fn record(&self, event_id: &str, update: EventUpdate) {
        if let Err(ledger_error) = self.ledger.update_state(event_id, update).await {
            warn!(
                event_name = "worker.ledger.update_failed",
                event_id = %event_id,
                error = %ledger_error,
                "could not record event state"
            );
        }
    }
}
