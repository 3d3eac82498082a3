//! Events API payloads the bot reacts to. Everything else deserializes to
//! an `Unsupported` variant and is acknowledged without work.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiPayload {
    UrlVerification { challenge: String },
    EventCallback(EventCallback),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EventCallback {
    pub event_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub event: InnerEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InnerEvent {
    AppMention(AppMentionEvent),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AppMentionEvent {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl AppMentionEvent {
    /// Replies go to the existing thread, or start one under the mention.
    pub fn reply_thread_ts(&self) -> Option<&str> {
        self.thread_ts.as_deref().or(self.ts.as_deref())
    }

    /// Stable per channel, thread and user.
    pub fn conversation_key(&self) -> String {
        format!(
            "slack:{}:{}:{}",
            self.channel.as_deref().unwrap_or("unknown-channel"),
            self.reply_thread_ts().unwrap_or("no-thread"),
            self.user.as_deref().unwrap_or("unknown-user"),
        )
    }
}

pub fn parse_payload(body: &[u8]) -> Result<EventsApiPayload, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Text after the first `>`, so the leading `<@BOT>` mention is dropped.
pub fn extract_question(text: &str) -> &str {
    match text.split_once('>') {
        Some((_, question)) => question.trim(),
        None => text.trim(),
    }
}

/// One mention ready for the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MentionJob {
    pub event_id: String,
    pub channel: String,
    pub user: String,
    pub question: String,
    pub reply_thread_ts: String,
    pub conversation_key: String,
}

impl MentionJob {
    /// `None` for events other than `app_mention`, or mentions without a
    /// channel or timestamp to reply to.
    pub fn from_callback(callback: &EventCallback) -> Option<Self> {
        let InnerEvent::AppMention(mention) = &callback.event else {
            return None;
        };
        let channel = mention.channel.clone()?;
        let reply_thread_ts = mention.reply_thread_ts()?.to_string();

        Some(Self {
            event_id: callback.event_id.clone(),
            channel,
            user: mention.user.clone().unwrap_or_else(|| "Desconhecido".to_string()),
            question: extract_question(&mention.text).to_string(),
            reply_thread_ts,
            conversation_key: mention.conversation_key(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        extract_question, parse_payload, AppMentionEvent, EventsApiPayload, InnerEvent, MentionJob,
    };

    #[test]
    fn url_verification_exposes_challenge() {
        let payload = parse_payload(br#"{"type":"url_verification","token":"t","challenge":"abc123"}"#)
            .expect("payload");
        assert_eq!(payload, EventsApiPayload::UrlVerification { challenge: "abc123".to_string() });
    }

    #[test]
    fn app_mention_becomes_job() {
        let body = r#"{
            "type": "event_callback",
            "team_id": "T1",
            "event_id": "Ev08MFMKH6",
            "event": {
                "type": "app_mention",
                "user": "U061F7AUR",
                "text": "<@U0LAN0Z89> quais foram as vendas desse mês?",
                "ts": "1515449522.000016",
                "channel": "C0LAN2Q65",
                "event_ts": "1515449522000016"
            }
        }"#;

        let payload = parse_payload(body.as_bytes()).expect("payload");
        let EventsApiPayload::EventCallback(callback) = payload else {
            panic!("expected event callback");
        };
        let job = MentionJob::from_callback(&callback).expect("job");

        assert_eq!(job.event_id, "Ev08MFMKH6");
        assert_eq!(job.question, "quais foram as vendas desse mês?");
        assert_eq!(job.reply_thread_ts, "1515449522.000016");
        assert_eq!(job.conversation_key, "slack:C0LAN2Q65:1515449522.000016:U061F7AUR");
    }

    #[test]
    fn other_events_are_unsupported() {
        let body = br#"{"type":"event_callback","event_id":"Ev1","event":{"type":"reaction_added"}}"#;
        let EventsApiPayload::EventCallback(callback) = parse_payload(body).expect("payload") else {
            panic!("expected event callback");
        };
        assert_eq!(callback.event, InnerEvent::Unsupported);
        assert_eq!(MentionJob::from_callback(&callback), None);

        let payload = parse_payload(br#"{"type":"app_rate_limited"}"#).expect("payload");
        assert_eq!(payload, EventsApiPayload::Unsupported);
    }

    #[test]
    fn thread_replies_keep_parent_thread() {
        let mention = AppMentionEvent {
            user: None,
            text: String::new(),
            channel: Some("C1".to_string()),
            ts: Some("2.0".to_string()),
            thread_ts: Some("1.0".to_string()),
        };
        assert_eq!(mention.reply_thread_ts(), Some("1.0"));
        assert_eq!(mention.conversation_key(), "slack:C1:1.0:unknown-user");
        assert_eq!(AppMentionEvent::default().conversation_key(), "slack:unknown-channel:no-thread:unknown-user");
    }

    #[test]
    fn question_is_text_after_first_mention() {
        assert_eq!(extract_question("<@U1>  total de vendas > 10?  "), "total de vendas > 10?");
        assert_eq!(extract_question("  sem menção "), "sem menção");
        assert_eq!(extract_question("<@U1>"), "");
    }
}
