use async_trait::async_trait;
use strategy_graph::StrategyGraph;
use strategy_runtime::{EventSink, RoundContext, RoundOutput, SubAgent};
use tokio::sync::Mutex;

/// A canned, scriptable `SubAgent` double: each call to `run_round` pops
/// the next closure off `script` and runs it against the shared graph.
/// Exhausting the script without creating a step makes the runner retry
/// until `MAX_ROUNDS`, exactly like a real sub-agent that keeps failing.
pub struct ScriptedSubAgent {
    script: Mutex<Vec<Box<dyn Fn(&mut StrategyGraph) -> RoundOutput + Send + Sync>>>,
}

impl ScriptedSubAgent {
    pub fn new(script: Vec<Box<dyn Fn(&mut StrategyGraph) -> RoundOutput + Send + Sync>>) -> Self {
        Self { script: Mutex::new(script) }
    }

    /// A sub-agent that immediately adds one leaf step named `search_name`
    /// and reports no errors — the common case in integration tests.
    pub fn always_adds_one_leaf(search_name: impl Into<String> + Send + Sync + 'static) -> Self {
        let search_name = search_name.into();
        Self::new(vec![Box::new(move |graph| {
            let id = graph
                .add_step(strategy_graph::NewStep::leaf(search_name.clone()))
                .expect("leaf step with no dependencies should never fail validation");
            RoundOutput::created([id])
        })])
    }

    /// A sub-agent that never creates a step, for exercising exhaustion.
    pub fn never_adds_a_step() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl SubAgent for ScriptedSubAgent {
    async fn run_round(
        &self,
        _ctx: RoundContext<'_>,
        graph: &tokio::sync::Mutex<StrategyGraph>,
        _emit: &dyn EventSink,
    ) -> RoundOutput {
        let mut script = self.script.lock().await;
        let Some(step) = (if script.is_empty() { None } else { Some(script.remove(0)) }) else {
            return RoundOutput::errors(["scripted sub-agent has no more rounds".to_string()]);
        };
        let mut g = graph.lock().await;
        step(&mut g)
    }
}
