//! Agent runtime: table routing and the question-answering pipeline.
//!
//! The model is only asked to pick a catalog id, write one read-only
//! statement and phrase the result. Which statements reach the warehouse is
//! decided by [`guardrails`], never by the model.
//!
//! - [`router`] resolves a question to a catalog entry (direct match, model
//!   choice, then [`live_catalog`] when enabled).
//! - [`runtime`] runs route → SQL → warehouse → interpretation.
//! - [`genie`] delegates a routed question to a Databricks Genie space.
//! - [`generation`] builds the generated catalog layer from warehouse
//!   metadata.
//! - [`llm`] and [`warehouse`] are the injected client seams.

pub mod generation;
pub mod genie;
pub mod guardrails;
pub mod live_catalog;
pub mod llm;
pub mod prompts;
pub mod router;
pub mod runtime;
pub mod warehouse;

pub use generation::{generate_entries, GenerationRequest};
pub use genie::{DatabricksGenieClient, GenieClient, GenieReply};
pub use llm::{HttpLlmClient, LlmClient};
pub use router::TableRouter;
pub use runtime::{AgentRuntime, Answer};
pub use warehouse::{DatabricksSqlClient, WarehouseClient};
