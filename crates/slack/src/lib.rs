//! Slack Events API surface for slacklake.
//!
//! - [`signature`] verifies signed requests.
//! - [`events`] parses envelopes and turns `app_mention` into a [`events::MentionJob`].
//! - [`client`] posts and updates thread messages through the Web API.
//! - [`messages`] holds the texts the bot writes.

pub mod client;
pub mod events;
pub mod messages;
pub mod signature;

pub use client::{HttpSlackClient, PostedMessage, SlackApiError, SlackWebClient};
pub use events::{parse_payload, EventsApiPayload, MentionJob};
pub use signature::{SignatureError, SignatureVerifier};
