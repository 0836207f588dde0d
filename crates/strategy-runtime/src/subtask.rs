use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use strategy_core::cancel::CancelToken;
use strategy_graph::StrategyGraph;
use strategy_types::{ChatMessage, Event, EventType, StepId, TaskNotes, TaskResult};
use tokio::sync::Mutex;

use crate::sub_agent::{EventSink, RoundContext, SubAgent};

/// Sub-tasks get up to 5 rounds before the runner gives up (§4.4 step 3).
/// Deliberately more aggressive than the adapter's per-call retry budget —
/// "no steps created" is almost always a recoverable catalog-lookup miss,
/// not a transient fault.
pub const MAX_ROUNDS: u32 = 5;

fn build_round_prompt(task: &str, goal: &str, graph_id: &str, dependency_context: Option<&str>) -> String {
    let mut prompt = format!("Task: {task}\nGoal: {goal}\nGraph: {graph_id}\n");
    if let Some(ctx) = dependency_context {
        prompt.push_str(ctx);
        prompt.push('\n');
    }
    prompt
}

fn build_retry_prompt(base: &str, errors: &[String]) -> String {
    let error_hint = if errors.is_empty() {
        "no steps created".to_string()
    } else {
        errors.join("; ")
    };
    format!(
        "Retry the task and you MUST create at least one valid step.\n\
         Before creating anything, consult the catalog for available searches and their \
         required parameters.\n\
         Previous issue: {error_hint}\n{base}"
    )
}

/// Drive one sub-agent through one task, guaranteeing either at least one
/// new step on `graph` or a structured failure (§4.4).
pub async fn run_subtask(
    task: &str,
    goal: &str,
    sub_agent: &dyn SubAgent,
    graph: &Mutex<StrategyGraph>,
    dependency_context: Option<&str>,
    chat_history: &[ChatMessage],
    emit: &dyn EventSink,
    round_timeout: Duration,
    cancel: &CancelToken,
) -> TaskResult {
    let sanitized_history = strategy_types::sanitize_for_subagent(chat_history);

    let graph_id = graph.lock().await.id().clone();

    emit.emit(Event::new(
        EventType::SubkaniTaskStart,
        json!({ "task": task }),
    ))
    .await;

    let mut prompt = build_round_prompt(task, goal, graph_id.as_str(), dependency_context);
    let mut created_steps: Vec<StepId> = Vec::new();
    let mut last_errors: Vec<String> = Vec::new();

    for attempt in 1..=MAX_ROUNDS {
        if cancel.is_cancelled() {
            emit.emit(Event::new(
                EventType::SubkaniTaskEnd,
                json!({ "task": task, "status": "timeout" }),
            ))
            .await;
            return TaskResult {
                id: String::new(),
                task: task.to_string(),
                kind: strategy_types::PlanNodeKind::Task,
                steps: vec![],
                subtree_root: None,
                notes: TaskNotes::Timeout,
                errors: vec![],
                contract_violation: false,
            };
        }

        let ctx = RoundContext {
            task,
            goal,
            graph_id: &graph_id,
            round_prompt: &prompt,
            chat_history: &sanitized_history,
        };

        enum RoundOutcome {
            Done(crate::sub_agent::RoundOutput),
            TimedOut,
        }

        let outcome = tokio::select! {
            result = tokio::time::timeout(round_timeout, sub_agent.run_round(ctx, graph, emit)) => {
                match result {
                    Ok(output) => RoundOutcome::Done(output),
                    Err(_) => RoundOutcome::TimedOut,
                }
            }
            _ = cancel.cancelled() => RoundOutcome::TimedOut,
        };

        let round_output = match outcome {
            RoundOutcome::Done(output) => output,
            RoundOutcome::TimedOut => {
                emit.emit(Event::new(
                    EventType::SubkaniTaskEnd,
                    json!({ "task": task, "status": "timeout" }),
                ))
                .await;
                return TaskResult {
                    id: String::new(),
                    task: task.to_string(),
                    kind: strategy_types::PlanNodeKind::Task,
                    steps: vec![],
                    subtree_root: None,
                    notes: TaskNotes::Timeout,
                    errors: vec![],
                    contract_violation: false,
                };
            }
        };
        last_errors = round_output.errors;

        // `round_output.created` is self-reported by the sub-agent rather
        // than inferred by diffing the graph's step set: the scheduler runs
        // independent tasks concurrently against the one shared graph, so a
        // diff can't tell this task's own additions apart from a sibling's
        // landing in the same window (§4.5).
        for id in &round_output.created {
            created_steps.push(id.clone());
            emit.emit(Event::new(
                EventType::StrategyUpdate,
                json!({ "graphId": graph_id.as_str(), "stepId": id.as_str() }),
            ))
            .await;
        }

        if !created_steps.is_empty() {
            let roots_after: HashSet<StepId> = {
                let g = graph.lock().await;
                g.root_ids().into_iter().collect()
            };
            // Restricted to steps *this task* created rather than a whole-graph
            // root diff, for the same concurrency reason as above — a sibling
            // task's own new root must not count toward this task's
            // contract-violation/ambiguous-subtree-root check.
            let my_new_roots: Vec<&StepId> =
                created_steps.iter().filter(|id| roots_after.contains(*id)).collect();
            let subtree_root = if my_new_roots.len() == 1 {
                Some(my_new_roots[0].clone())
            } else {
                None
            };
            // orchestrator.py::run_subkani_task logs a warning here rather than
            // failing the task; the core has no logging layer (§B), so the
            // violation travels as a field on the result instead.
            let contract_violation = my_new_roots.len() != 1;

            emit.emit(Event::new(
                EventType::SubkaniTaskEnd,
                json!({ "task": task, "status": "done" }),
            ))
            .await;

            return TaskResult {
                id: String::new(),
                task: task.to_string(),
                kind: strategy_types::PlanNodeKind::Task,
                steps: created_steps,
                subtree_root,
                notes: TaskNotes::Created,
                errors: vec![],
                contract_violation,
            };
        }

        if attempt < MAX_ROUNDS {
            emit.emit(Event::new(
                EventType::SubkaniTaskRetry,
                json!({ "task": task, "attempt": attempt + 1 }),
            ))
            .await;
            prompt = build_retry_prompt(&prompt, &last_errors);
        }
    }

    emit.emit(Event::new(
        EventType::SubkaniTaskEnd,
        json!({ "task": task, "status": "no_steps" }),
    ))
    .await;
    TaskResult {
        id: String::new(),
        task: task.to_string(),
        kind: strategy_types::PlanNodeKind::Task,
        steps: vec![],
        subtree_root: None,
        notes: TaskNotes::NoSteps,
        errors: last_errors,
        contract_violation: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use strategy_types::GraphId;

    struct NullSink;

    #[async_trait]
    impl EventSink for NullSink {
        async fn emit(&self, _event: Event) {}
    }

    /// Adds no step on round 1, then adds one step on round 2 (S5).
    struct RetryOnceAgent {
        rounds_run: AtomicUsize,
    }

    #[async_trait]
    impl SubAgent for RetryOnceAgent {
        async fn run_round(
            &self,
            _ctx: RoundContext<'_>,
            graph: &Mutex<StrategyGraph>,
            _emit: &dyn EventSink,
        ) -> crate::sub_agent::RoundOutput {
            let round = self.rounds_run.fetch_add(1, Ordering::SeqCst);
            if round == 0 {
                return crate::sub_agent::RoundOutput::errors(["no matching search".to_string()]);
            }
            let mut g = graph.lock().await;
            let id = g.add_step(strategy_graph::NewStep::leaf("FoundSearch")).unwrap();
            crate::sub_agent::RoundOutput::created([id])
        }
    }

    /// Echoes the dependency context verbatim into a captured slot (S4).
    struct EchoAgent {
        captured_prompt: StdMutex<Option<String>>,
    }

    #[async_trait]
    impl SubAgent for EchoAgent {
        async fn run_round(
            &self,
            ctx: RoundContext<'_>,
            graph: &Mutex<StrategyGraph>,
            _emit: &dyn EventSink,
        ) -> crate::sub_agent::RoundOutput {
            *self.captured_prompt.lock().unwrap() = Some(ctx.round_prompt.to_string());
            let mut g = graph.lock().await;
            let id = g.add_step(strategy_graph::NewStep::leaf("Echo")).unwrap();
            crate::sub_agent::RoundOutput::created([id])
        }
    }

    fn test_graph() -> Mutex<StrategyGraph> {
        Mutex::new(StrategyGraph::new(GraphId::new("g1"), "Test", None))
    }

    #[tokio::test]
    async fn s5_retries_once_then_succeeds() {
        let agent = RetryOnceAgent {
            rounds_run: AtomicUsize::new(0),
        };
        let graph = test_graph();
        let result = run_subtask(
            "find A",
            "goal",
            &agent,
            &graph,
            None,
            &[],
            &NullSink,
            Duration::from_secs(5),
            &CancelToken::never(),
        )
        .await;

        assert_eq!(agent.rounds_run.load(Ordering::SeqCst), 2);
        assert_eq!(result.notes, TaskNotes::Created);
        assert_eq!(result.steps.len(), 1);
        assert!(result.subtree_root.is_some());
        assert_eq!(result.subtree_root.as_ref(), result.steps.first());
        assert!(!result.contract_violation);
    }

    #[tokio::test]
    async fn two_new_roots_in_one_round_is_a_contract_violation_but_not_a_failure() {
        struct TwoLeafAgent;
        #[async_trait]
        impl SubAgent for TwoLeafAgent {
            async fn run_round(
                &self,
                _ctx: RoundContext<'_>,
                graph: &Mutex<StrategyGraph>,
                _emit: &dyn EventSink,
            ) -> crate::sub_agent::RoundOutput {
                let mut g = graph.lock().await;
                let first = g.add_step(strategy_graph::NewStep::leaf("First")).unwrap();
                let second = g.add_step(strategy_graph::NewStep::leaf("Second")).unwrap();
                crate::sub_agent::RoundOutput::created([first, second])
            }
        }

        let graph = test_graph();
        let result = run_subtask(
            "find A",
            "goal",
            &TwoLeafAgent,
            &graph,
            None,
            &[],
            &NullSink,
            Duration::from_secs(5),
            &CancelToken::never(),
        )
        .await;

        assert_eq!(result.notes, TaskNotes::Created);
        assert_eq!(result.steps.len(), 2);
        assert!(result.subtree_root.is_none());
        assert!(result.contract_violation);
    }

    /// A step already on the graph before the task starts (e.g. a
    /// caller-seeded root) must never show up in `TaskResult.steps` or
    /// trigger a `strategy_update` for this task — the runner trusts the
    /// agent's self-reported `created` ids rather than diffing the graph.
    #[tokio::test]
    async fn pre_existing_steps_are_not_attributed_to_the_task() {
        struct OneLeafAgent;
        #[async_trait]
        impl SubAgent for OneLeafAgent {
            async fn run_round(
                &self,
                _ctx: RoundContext<'_>,
                graph: &Mutex<StrategyGraph>,
                _emit: &dyn EventSink,
            ) -> crate::sub_agent::RoundOutput {
                let mut g = graph.lock().await;
                let id = g.add_step(strategy_graph::NewStep::leaf("FoundSearch")).unwrap();
                crate::sub_agent::RoundOutput::created([id])
            }
        }

        let graph = test_graph();
        let seed = {
            let mut g = graph.lock().await;
            g.add_step(strategy_graph::NewStep::leaf("SeedSearch")).unwrap()
        };

        let result = run_subtask(
            "find A",
            "goal",
            &OneLeafAgent,
            &graph,
            None,
            &[],
            &NullSink,
            Duration::from_secs(5),
            &CancelToken::never(),
        )
        .await;

        assert_eq!(result.steps.len(), 1);
        assert!(!result.steps.contains(&seed));
        assert!(result.subtree_root.is_some());
        assert_ne!(result.subtree_root.as_ref(), Some(&seed));
        assert!(!result.contract_violation);
    }

    /// Two tasks run concurrently against the same shared graph, each adding
    /// exactly one root of their own. Neither task's result should be
    /// contaminated by the other's addition (§4.5).
    #[tokio::test]
    async fn concurrent_sibling_tasks_do_not_taint_each_other_s_subtree_root() {
        struct OneLeafAgent {
            name: &'static str,
        }
        #[async_trait]
        impl SubAgent for OneLeafAgent {
            async fn run_round(
                &self,
                _ctx: RoundContext<'_>,
                graph: &Mutex<StrategyGraph>,
                _emit: &dyn EventSink,
            ) -> crate::sub_agent::RoundOutput {
                let mut g = graph.lock().await;
                let id = g.add_step(strategy_graph::NewStep::leaf(self.name)).unwrap();
                crate::sub_agent::RoundOutput::created([id])
            }
        }

        let graph = test_graph();
        let left = OneLeafAgent { name: "Left" };
        let right = OneLeafAgent { name: "Right" };

        let (left_result, right_result) = tokio::join!(
            run_subtask(
                "find A", "goal", &left, &graph, None, &[], &NullSink,
                Duration::from_secs(5), &CancelToken::never(),
            ),
            run_subtask(
                "find B", "goal", &right, &graph, None, &[], &NullSink,
                Duration::from_secs(5), &CancelToken::never(),
            ),
        );

        for result in [&left_result, &right_result] {
            assert_eq!(result.steps.len(), 1);
            assert!(result.subtree_root.is_some());
            assert_eq!(result.subtree_root.as_ref(), result.steps.first());
            assert!(!result.contract_violation);
        }
        assert_ne!(left_result.steps, right_result.steps);
    }

    #[tokio::test]
    async fn s4_dependency_context_is_injected_verbatim() {
        let agent = EchoAgent {
            captured_prompt: StdMutex::new(None),
        };
        let graph = test_graph();
        let dep_context = "Context from t1 (find A): {\"steps\":[]}";
        run_subtask(
            "refine",
            "goal",
            &agent,
            &graph,
            Some(dep_context),
            &[],
            &NullSink,
            Duration::from_secs(5),
            &CancelToken::never(),
        )
        .await;

        let captured = agent.captured_prompt.lock().unwrap().clone().unwrap();
        assert!(captured.contains(dep_context));
    }

    #[tokio::test]
    async fn exhausting_all_rounds_reports_no_steps() {
        struct NeverAgent;
        #[async_trait]
        impl SubAgent for NeverAgent {
            async fn run_round(
                &self,
                _ctx: RoundContext<'_>,
                _graph: &Mutex<StrategyGraph>,
                _emit: &dyn EventSink,
            ) -> crate::sub_agent::RoundOutput {
                crate::sub_agent::RoundOutput::errors(["still nothing".to_string()])
            }
        }

        let graph = test_graph();
        let result = run_subtask(
            "find A",
            "goal",
            &NeverAgent,
            &graph,
            None,
            &[],
            &NullSink,
            Duration::from_secs(5),
            &CancelToken::never(),
        )
        .await;

        assert_eq!(result.notes, TaskNotes::NoSteps);
        assert!(result.steps.is_empty());
        assert_eq!(result.errors, vec!["still nothing".to_string()]);
    }
}
