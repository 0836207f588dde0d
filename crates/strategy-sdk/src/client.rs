use std::sync::Arc;

use strategy_core::cancel::CancelToken;
use strategy_graph::StrategyGraph;
use strategy_platform::PlatformClient;
use strategy_runtime::{EventSink, RuntimeConfig, SubAgent};
use tokio::sync::Mutex;

use crate::pipeline::TurnEventPipeline;
use crate::store::ConversationStore;

/// Thin facade over the orchestration core's internal layers (graph,
/// runtime, platform adapter, event pipeline), mirroring `agtrace-sdk::Client`'s
/// role of wrapping the runtime crate behind a small public surface.
pub struct Client {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn ConversationStore>,
    config: RuntimeConfig,
}

impl Client {
    pub fn new(platform: Arc<dyn PlatformClient>, store: Arc<dyn ConversationStore>, config: RuntimeConfig) -> Self {
        Self { platform, store, config }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    /// Open a turn against `strategy_id`: a fresh graph, a pipeline wired
    /// to this client's store, and the shared scheduler config (§4.7 C7 —
    /// "thin facade" over the session/graph contracts already defined by
    /// §4.1 and §3).
    pub fn open_turn(&self, strategy_id: impl Into<String>, auth_token: impl Into<String>) -> TurnHandle {
        let strategy_id = strategy_id.into();
        TurnHandle {
            graph: Arc::new(Mutex::new(StrategyGraph::with_history_capacity(
                strategy_types::GraphId::new(strategy_id.clone()),
                "",
                None,
                self.config.undo_history_capacity,
            ))),
            pipeline: Arc::new(TurnEventPipeline::new(strategy_id, auth_token, self.store.clone())),
            config: self.config.clone(),
        }
    }
}

/// One conversational turn's graph + event pipeline, scoped to the
/// lifetime of a single SSE stream.
pub struct TurnHandle {
    graph: Arc<Mutex<StrategyGraph>>,
    pipeline: Arc<TurnEventPipeline>,
    config: RuntimeConfig,
}

impl TurnHandle {
    pub fn graph(&self) -> &Arc<Mutex<StrategyGraph>> {
        &self.graph
    }

    pub fn pipeline(&self) -> &Arc<TurnEventPipeline> {
        &self.pipeline
    }

    pub async fn run_plan(
        &self,
        plan: strategy_types::DelegationPlan,
        sub_agent: Arc<dyn SubAgent>,
        goal: &str,
        emit: Arc<dyn EventSink>,
        cancel: CancelToken,
    ) -> strategy_types::Result<strategy_runtime::SchedulerOutput> {
        strategy_runtime::run_delegation_plan(
            plan,
            &self.config.scheduler_config(),
            sub_agent,
            self.graph.clone(),
            goal,
            emit,
            cancel,
        )
        .await
    }
}
