use std::sync::Arc;

use tracing::{error, info, warn};

use slacklake_core::routing::{interpret_answer, plan_route, LexicalIndex, RoutePlan};
use slacklake_core::{Catalog, NotFoundReason, RouteSource, RouterSettings, RoutingOutcome};

use crate::live_catalog::LiveCatalog;
use crate::llm::LlmClient;
use crate::prompts::router_prompt;

/// Picks the catalog entry that answers a question. Direct matches never
/// reach the model; everything else goes through one model call, then the
/// live-catalog fallback when configured.
pub struct TableRouter {
    catalog: Arc<Catalog>,
    index: LexicalIndex,
    llm: Arc<dyn LlmClient>,
    settings: RouterSettings,
    live: Option<LiveCatalog>,
}

impl TableRouter {
    pub fn new(catalog: Arc<Catalog>, llm: Arc<dyn LlmClient>, settings: RouterSettings) -> Self {
        let index = LexicalIndex::new(&catalog);
        Self { catalog, index, llm, settings, live: None }
    }

    pub fn with_live_catalog(mut self, live: Option<LiveCatalog>) -> Self {
        self.live = live;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub async fn identify_table(&self, question: &str) -> RoutingOutcome {
        let outcome = self.route_catalog(question).await;
        let RoutingOutcome::NotFound(reason) = outcome else {
            return outcome;
        };

        let Some(live) = &self.live else {
            return RoutingOutcome::NotFound(reason);
        };
        match live.build_live_context(question, self.llm.as_ref()).await {
            Some(entry) => {
                info!(
                    event_name = "router.live_catalog.resolved",
                    entry_id = %entry.id(),
                    "live catalog resolved the question"
                );
                RoutingOutcome::Resolved { entry, source: RouteSource::LiveCatalog }
            }
            None => RoutingOutcome::NotFound(reason),
        }
    }

    async fn route_catalog(&self, question: &str) -> RoutingOutcome {
        let (candidates, options) =
            match plan_route(&self.catalog, &self.index, question, &self.settings) {
                RoutePlan::Direct(entry) => {
                    info!(
                        event_name = "router.direct_match",
                        entry_id = %entry.id(),
                        "question names a catalog entry directly"
                    );
                    return RoutingOutcome::Resolved {
                        entry: entry.clone(),
                        source: RouteSource::DirectMatch,
                    };
                }
                RoutePlan::EmptyCatalog => {
                    warn!(event_name = "router.empty_catalog", "catalog is empty; skipping model");
                    return RoutingOutcome::NotFound(NotFoundReason::EmptyCatalog);
                }
                RoutePlan::AskModel { candidates, options } => (candidates, options),
            };

        info!(
            event_name = "router.candidates",
            candidate_count = candidates.len(),
            best_score = candidates.first().map(|scored| scored.score).unwrap_or(0),
            options_chars = options.chars().count(),
            "asking model to choose a table"
        );

        let raw = match self.llm.complete(&router_prompt(question, &options)).await {
            Ok(raw) => raw,
            Err(model_error) => {
                error!(
                    event_name = "router.model_error",
                    error = %model_error,
                    "router model call failed"
                );
                return RoutingOutcome::ModelError { detail: model_error.to_string() };
            }
        };

        let outcome = interpret_answer(&self.catalog, &raw);
        match &outcome {
            RoutingOutcome::Resolved { entry, .. } => info!(
                event_name = "router.model.resolved",
                entry_id = %entry.id(),
                "router model chose a table"
            ),
            RoutingOutcome::NotFound(NotFoundReason::Unresolved { raw }) => warn!(
                event_name = "router.model.unresolved",
                answer = %raw,
                "router model answered an id outside the catalog"
            ),
            _ => info!(event_name = "router.model.none", "router model found no suitable table"),
        }
        outcome
    }
}
