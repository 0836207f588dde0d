use async_trait::async_trait;
use strategy_types::{ChatMessage, Event, GraphId, StepId};

/// Per-round input to a [`SubAgent`] (§4.4 step 2: "Build a round prompt
/// from `{task, goal, graphId, dependencyContext}`").
#[derive(Debug, Clone)]
pub struct RoundContext<'a> {
    pub task: &'a str,
    pub goal: &'a str,
    pub graph_id: &'a GraphId,
    pub round_prompt: &'a str,
    pub chat_history: &'a [ChatMessage],
}

/// Sink a sub-agent streams its tool-call activity through while a round
/// runs (§4.4 step 3a, §4.6 "the event source ... blocks naturally because
/// `emit` is an awaitable call into the pipeline").
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// What one round produced: the ids the agent itself created on `graph`
/// this round, and any textual errors it hit. `created` is self-reported
/// rather than inferred by diffing the graph, because the scheduler can run
/// several tasks concurrently against the same shared graph (§4.5) and a
/// diff can't tell this task's own additions apart from a sibling's landing
/// in the same window.
#[derive(Debug, Clone, Default)]
pub struct RoundOutput {
    pub created: Vec<StepId>,
    pub errors: Vec<String>,
}

impl RoundOutput {
    pub fn created(ids: impl IntoIterator<Item = StepId>) -> Self {
        Self { created: ids.into_iter().collect(), errors: Vec::new() }
    }

    pub fn errors(errors: impl IntoIterator<Item = String>) -> Self {
        Self { created: Vec::new(), errors: errors.into_iter().collect() }
    }
}

/// The driven sub-agent process behind §9's "`run(round_prompt, tools) ->
/// stream<ToolCall|AssistantMessage>`" interface, specialized to this core's
/// shape: a round mutates the shared graph directly (through the same tool
/// surface the parent agent uses) and self-reports the step ids it created,
/// since [`crate::subtask::run_subtask`] can no longer trust a graph-wide
/// diff to attribute creations to the right task once rounds run
/// concurrently against one shared graph.
#[async_trait]
pub trait SubAgent: Send + Sync {
    async fn run_round(
        &self,
        ctx: RoundContext<'_>,
        graph: &tokio::sync::Mutex<strategy_graph::StrategyGraph>,
        emit: &dyn EventSink,
    ) -> RoundOutput;
}
