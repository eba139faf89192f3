use std::sync::Arc;

use mien_core::time::now_unix_secs;
use mien_core::{Affect, LearnerConfig, ResponseEffectivenessLearner};
use mien_store::ProfileStore;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct MienServer {
    state: Arc<Mutex<ServerState>>,
    tool_router: ToolRouter<Self>,
}

struct ServerState {
    learner: ResponseEffectivenessLearner,
    store: ProfileStore,
    rng: SmallRng,
}

impl MienServer {
    pub fn new(store: ProfileStore, config: LearnerConfig) -> std::result::Result<Self, String> {
        let learner = store
            .load_learner(config)
            .map_err(|e| format!("failed to load learner: {e}"))?;
        Ok(Self::with_parts(learner, store, SmallRng::from_os_rng()))
    }

    fn with_parts(learner: ResponseEffectivenessLearner, store: ProfileStore, rng: SmallRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                learner,
                store,
                rng,
            })),
            tool_router: Self::tool_router(),
        }
    }

    fn entries_json(learner: &ResponseEffectivenessLearner, affect: Affect) -> serde_json::Value {
        learner
            .entries_for(affect)
            .map(|e| {
                serde_json::json!({
                    "responseId": e.response_id,
                    "successCount": e.success_count,
                    "totalCount": e.total_count,
                    "weight": e.weight,
                    "score": e.score(),
                })
            })
            .collect()
    }
}

fn parse_affect(s: &str) -> Result<Affect, McpError> {
    s.parse().map_err(|e: String| McpError::invalid_params(e, None))
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct RecordRequest {
    /// Detected human affect: neutral, happy, sad, surprised, angry, confused, excited
    affect: String,
    /// Identifier of the character response that was played
    response_id: String,
    /// Whether the response landed well
    success: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BestRequest {
    /// Detected human affect
    affect: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ChooseRequest {
    /// Detected human affect
    affect: String,
    /// Responses the character can play right now. When empty, only a learned
    /// best response can be returned.
    #[serde(default)]
    candidates: Vec<String>,
}

#[tool_router]
impl MienServer {
    #[tool(
        description = "Record whether a character response worked for a detected human affect. Call this after observing the user's reaction. Returns the updated effectiveness entry."
    )]
    async fn mien_record(
        &self,
        Parameters(req): Parameters<RecordRequest>,
    ) -> Result<CallToolResult, McpError> {
        let affect = parse_affect(&req.affect)?;
        let response_id = req.response_id.trim();
        if response_id.is_empty() {
            return Err(McpError::invalid_params(
                "response_id must not be empty".to_string(),
                None,
            ));
        }

        let mut state = self.state.lock().await;
        let ServerState { learner, store, .. } = &mut *state;
        learner.tick(now_unix_secs());

        if let Err(e) = store.record(learner, affect, response_id, req.success) {
            tracing::error!("failed to persist interaction: {e}");
        }

        let entry = learner.entry(affect, response_id).cloned();
        let json = serde_json::json!({
            "affect": affect,
            "responseId": response_id,
            "successCount": entry.as_ref().map(|e| e.success_count),
            "totalCount": entry.as_ref().map(|e| e.total_count),
            "weight": entry.as_ref().map(|e| e.weight),
            "canRecommend": learner.can_recommend(),
        });
        Ok(json_result(&json))
    }

    #[tool(
        description = "Get the response that has worked best so far for a detected human affect, with the per-response effectiveness table. `best` is null when nothing has been recorded for the affect."
    )]
    async fn mien_best(
        &self,
        Parameters(req): Parameters<BestRequest>,
    ) -> Result<CallToolResult, McpError> {
        let affect = parse_affect(&req.affect)?;
        let state = self.state.lock().await;

        let json = serde_json::json!({
            "affect": affect,
            "best": state.learner.best_response(affect),
            "canRecommend": state.learner.can_recommend(),
            "entries": Self::entries_json(&state.learner, affect),
        });
        Ok(json_result(&json))
    }

    #[tool(
        description = "Choose a response to play for a detected human affect. Returns the learned best among the candidates once enough interactions are recorded, otherwise a random candidate."
    )]
    async fn mien_choose(
        &self,
        Parameters(req): Parameters<ChooseRequest>,
    ) -> Result<CallToolResult, McpError> {
        let affect = parse_affect(&req.affect)?;
        let mut state = self.state.lock().await;
        let ServerState { learner, rng, .. } = &mut *state;

        let choice = learner.choose_response(affect, &req.candidates, rng);
        let json = serde_json::json!({
            "affect": affect,
            "choice": choice,
            "learned": learner.can_recommend(),
        });
        Ok(json_result(&json))
    }

    #[tool(description = "Show learner statistics for the current character profile.")]
    async fn mien_stats(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let learner = &state.learner;

        let mut stats = serde_json::json!({
            "profile": state.store.profile_name(),
            "entries": learner.entry_count(),
            "observations": learner.total_interactions(),
            "canRecommend": learner.can_recommend(),
            "history": learner.history().len(),
            "dominantAffect": learner.history().dominant_affect(),
        });

        if let Ok(n) = state.store.profile_store().interaction_count() {
            stats["interactions"] = serde_json::json!(n);
        }
        if let Ok(n) = state.store.global_store().entry_count() {
            stats["globalEntries"] = serde_json::json!(n);
        }

        Ok(json_result(&stats))
    }
}

#[tool_handler]
impl ServerHandler for MienServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "You drive the responses of an animated cat character and learn which ones work.\n\n\
                 LOOP:\n\
                 1. When a user affect is detected (neutral, happy, sad, surprised, angry, confused, excited), \
                    call mien_choose with the responses the character can play right now.\n\
                 2. Play the chosen response, watch the reaction, then call mien_record with success true or false.\n\
                 3. Use mien_best to inspect what has worked for an affect, mien_stats for an overview.\n\n\
                 Until enough interactions are recorded, mien_choose explores at random."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
