use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strategy_core::cancel::CancelToken;
use strategy_graph::{NewStep, StrategyGraph};
use strategy_types::{DelegationPlan, Error, ErrorCode, PlanNode, PlanNodeKind, Result, StepId, TaskNotes, TaskResult};
use tokio::sync::{Mutex, Semaphore};

use crate::sub_agent::{EventSink, SubAgent};
use crate::subtask::run_subtask;

/// Caps a `DelegationScheduler` run (spec.md §4.5 "Data structures" /
/// `maxConcurrency`).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub round_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            round_timeout: Duration::from_secs(90),
        }
    }
}

/// Final partition of a scheduler run (§4.5 "Failure propagation").
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerOutput {
    pub results: Vec<TaskResult>,
    pub rejected: Vec<TaskResult>,
    pub combine_results: Vec<TaskResult>,
    pub combine_errors: Vec<TaskResult>,
}

/// Every id a node must wait on before it is ready to run. For a combine
/// node this is `dependsOn ∪ inputs`: the plan's explicit ordering field
/// plus the fold operands it cannot resolve without their `TaskResult`s.
/// Spec.md §4.5 step 3 only spells out `dependsOn` for scheduling, but a
/// combine node that runs before an input it depends on has produced a
/// result has nothing to fold — this closure is the only reading that
/// makes the algorithm well-defined, and it's recorded here rather than
/// left implicit.
fn effective_deps(node: &PlanNode) -> HashSet<String> {
    let mut deps: HashSet<String> = node.depends_on().iter().cloned().collect();
    if let PlanNode::Combine { inputs, .. } = node {
        deps.extend(inputs.iter().cloned());
    }
    deps
}

/// Validate a plan per §4.5 step 1: every referenced id is declared, and
/// the effective-dependency graph has no cycles (Kahn's algorithm doubles
/// as the cycle check).
fn validate_plan(plan: &DelegationPlan) -> Result<()> {
    let declared: HashSet<&str> = plan.nodes.iter().map(|n| n.id()).collect();

    for node in &plan.nodes {
        for dep in effective_deps(node) {
            if !declared.contains(dep.as_str()) {
                return Err(Error::new(
                    ErrorCode::DelegationPlanInvalid,
                    format!("node {} references undeclared id {dep}", node.id()),
                ));
            }
        }
    }

    let mut indegree: HashMap<String, usize> = plan.nodes.iter().map(|n| (n.id().to_string(), 0)).collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for node in &plan.nodes {
        for dep in effective_deps(node) {
            *indegree.get_mut(node.id()).unwrap() += 1;
            dependents.entry(dep).or_default().push(node.id().to_string());
        }
    }

    let mut queue: Vec<String> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop() {
        visited += 1;
        if let Some(downstream) = dependents.get(&id) {
            for d in downstream.clone() {
                let entry = indegree.get_mut(&d).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push(d);
                }
            }
        }
    }

    if visited != plan.nodes.len() {
        return Err(Error::new(
            ErrorCode::DelegationPlanInvalid,
            "dependency graph contains a cycle",
        ));
    }
    Ok(())
}

fn dependency_context(node: &PlanNode, results: &HashMap<String, TaskResult>) -> Option<String> {
    let deps = node.depends_on();
    if deps.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(deps.len());
    for dep_id in deps {
        let Some(result) = results.get(dep_id) else {
            continue;
        };
        let summary = serde_json::to_string(result).unwrap_or_default();
        parts.push(format!("Context from {dep_id} ({}): {summary}", result.task));
    }
    Some(parts.join("\n"))
}

fn resolve_input(id: &str, results: &HashMap<String, TaskResult>) -> Option<StepId> {
    let result = results.get(id)?;
    result.subtree_root.clone().or_else(|| result.steps.first().cloned())
}

async fn materialize_combine(
    node_id: &str,
    inputs: &[String],
    operator: strategy_types::Operator,
    display_name: Option<&str>,
    graph: &Mutex<StrategyGraph>,
    results: &HashMap<String, TaskResult>,
) -> TaskResult {
    let mut resolved = Vec::with_capacity(inputs.len());
    for input_id in inputs {
        match resolve_input(input_id, results) {
            Some(step_id) => resolved.push(step_id),
            None => {
                return TaskResult {
                    id: node_id.to_string(),
                    task: node_id.to_string(),
                    kind: PlanNodeKind::Combine,
                    steps: vec![],
                    subtree_root: None,
                    notes: TaskNotes::NoSteps,
                    errors: vec![format!(
                        "MISSING_COMBINE_INPUTS: input {input_id} did not resolve to a step"
                    )],
                    contract_violation: false,
                };
            }
        }
    }

    let mut iter = resolved.into_iter();
    let Some(first) = iter.next() else {
        return TaskResult {
            id: node_id.to_string(),
            task: node_id.to_string(),
            kind: PlanNodeKind::Combine,
            steps: vec![],
            subtree_root: None,
            notes: TaskNotes::NoSteps,
            errors: vec!["MISSING_COMBINE_INPUTS: combine node has no inputs".to_string()],
            contract_violation: false,
        };
    };

    let mut current = first;
    let rest: Vec<StepId> = iter.collect();
    let mut g = graph.lock().await;
    for (idx, next) in rest.iter().enumerate() {
        let is_final = idx == rest.len() - 1;
        let mut new_step = NewStep::combine(current.clone(), next.clone(), operator);
        if is_final {
            if let Some(name) = display_name {
                new_step = new_step.with_display_name(name);
            }
        }
        match g.add_step(new_step) {
            Ok(id) => current = id,
            Err(e) => {
                return TaskResult {
                    id: node_id.to_string(),
                    task: node_id.to_string(),
                    kind: PlanNodeKind::Combine,
                    steps: vec![],
                    subtree_root: None,
                    notes: TaskNotes::NoSteps,
                    errors: vec![e.to_string()],
                    contract_violation: false,
                };
            }
        }
    }

    TaskResult {
        id: node_id.to_string(),
        task: node_id.to_string(),
        kind: PlanNodeKind::Combine,
        steps: vec![current.clone()],
        subtree_root: Some(current),
        notes: TaskNotes::Created,
        errors: vec![],
        contract_violation: false,
    }
}

/// Run a validated `DelegationPlan` to completion (§4.5 steps 2-4).
#[allow(clippy::too_many_arguments)]
pub async fn run_delegation_plan(
    plan: DelegationPlan,
    config: &SchedulerConfig,
    sub_agent: Arc<dyn SubAgent>,
    graph: Arc<Mutex<StrategyGraph>>,
    goal: &str,
    emit: Arc<dyn EventSink>,
    cancel: CancelToken,
) -> Result<SchedulerOutput> {
    validate_plan(&plan)?;

    let nodes_by_id: HashMap<String, PlanNode> =
        plan.nodes.into_iter().map(|n| (n.id().to_string(), n)).collect();

    let mut pending: HashMap<String, usize> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for (id, node) in &nodes_by_id {
        let deps = effective_deps(node);
        pending.insert(id.clone(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(id.clone());
        }
    }

    let results: Arc<Mutex<HashMap<String, TaskResult>>> = Arc::new(Mutex::new(HashMap::new()));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

    let mut ready: Vec<String> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut join_set = tokio::task::JoinSet::new();
    let mut in_flight = 0usize;

    loop {
        while let Some(node_id) = ready.pop() {
            let node = nodes_by_id.get(&node_id).unwrap().clone();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let results_ref = results.clone();
            let sub_agent = sub_agent.clone();
            let graph = graph.clone();
            let emit = emit.clone();
            let cancel = cancel.clone();
            let goal = goal.to_string();
            let round_timeout = config.round_timeout;

            join_set.spawn(async move {
                let _permit = permit;
                let dep_ctx = {
                    let r = results_ref.lock().await;
                    dependency_context(&node, &r)
                };

                let result = match &node {
                    PlanNode::Task { task, .. } => {
                        run_subtask(
                            task,
                            &goal,
                            sub_agent.as_ref(),
                            graph.as_ref(),
                            dep_ctx.as_deref(),
                            &[],
                            emit.as_ref(),
                            round_timeout,
                            &cancel,
                        )
                        .await
                    }
                    PlanNode::Combine {
                        inputs,
                        operator,
                        display_name,
                        ..
                    } => {
                        let r = results_ref.lock().await;
                        materialize_combine(
                            node.id(),
                            inputs,
                            *operator,
                            display_name.as_deref(),
                            graph.as_ref(),
                            &r,
                        )
                        .await
                    }
                };

                (node.id().to_string(), result)
            });
            in_flight += 1;
        }

        if in_flight == 0 {
            break;
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        in_flight -= 1;
        let (node_id, result) = joined.map_err(|e| {
            Error::new(ErrorCode::Fatal, format!("scheduler worker panicked: {e}"))
        })?;

        {
            let mut r = results.lock().await;
            r.insert(node_id.clone(), result);
        }

        if let Some(downstream) = dependents.get(&node_id) {
            for dep in downstream {
                let count = pending.get_mut(dep).unwrap();
                *count -= 1;
                if *count == 0 {
                    ready.push(dep.clone());
                }
            }
        }
    }

    let results = Arc::try_unwrap(results).unwrap().into_inner();
    let mut output = SchedulerOutput::default();
    for (id, node) in &nodes_by_id {
        let Some(result) = results.get(id).cloned() else {
            continue;
        };
        match node {
            PlanNode::Task { .. } => {
                if result.notes == TaskNotes::Created {
                    output.results.push(result);
                } else {
                    output.rejected.push(result);
                }
            }
            PlanNode::Combine { .. } => {
                if result.errors.is_empty() {
                    output.combine_results.push(result);
                } else {
                    output.combine_errors.push(result);
                }
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strategy_types::{Event, GraphId, Operator};

    struct NullSink;
    #[async_trait]
    impl EventSink for NullSink {
        async fn emit(&self, _event: Event) {}
    }

    struct AlwaysAddsOneStep;
    #[async_trait]
    impl SubAgent for AlwaysAddsOneStep {
        async fn run_round(
            &self,
            ctx: crate::sub_agent::RoundContext<'_>,
            graph: &Mutex<StrategyGraph>,
            _emit: &dyn EventSink,
        ) -> crate::sub_agent::RoundOutput {
            let mut g = graph.lock().await;
            let id = g.add_step(NewStep::leaf(ctx.task.to_string())).unwrap();
            crate::sub_agent::RoundOutput::created([id])
        }
    }

    fn test_graph() -> Arc<Mutex<StrategyGraph>> {
        Arc::new(Mutex::new(StrategyGraph::new(GraphId::new("g1"), "Test", None)))
    }

    #[tokio::test]
    async fn p7_dependent_waits_for_its_dependency() {
        let plan = DelegationPlan {
            nodes: vec![
                PlanNode::Task {
                    id: "t1".into(),
                    depends_on: vec![],
                    task: "find A".into(),
                    hint: None,
                    context: None,
                },
                PlanNode::Task {
                    id: "t2".into(),
                    depends_on: vec!["t1".into()],
                    task: "find B using A".into(),
                    hint: None,
                    context: None,
                },
            ],
        };

        let graph = test_graph();
        let output = run_delegation_plan(
            plan,
            &SchedulerConfig::default(),
            Arc::new(AlwaysAddsOneStep),
            graph,
            "goal",
            Arc::new(NullSink),
            CancelToken::never(),
        )
        .await
        .unwrap();

        assert_eq!(output.results.len(), 2);
        assert!(output.rejected.is_empty());
    }

    #[tokio::test]
    async fn combine_node_folds_its_task_inputs() {
        let plan = DelegationPlan {
            nodes: vec![
                PlanNode::Task {
                    id: "t1".into(),
                    depends_on: vec![],
                    task: "find A".into(),
                    hint: None,
                    context: None,
                },
                PlanNode::Task {
                    id: "t2".into(),
                    depends_on: vec![],
                    task: "find B".into(),
                    hint: None,
                    context: None,
                },
                PlanNode::Combine {
                    id: "c1".into(),
                    depends_on: vec![],
                    inputs: vec!["t1".into(), "t2".into()],
                    operator: Operator::Intersect,
                    display_name: Some("A and B".into()),
                    upstream: None,
                    downstream: None,
                },
            ],
        };

        let graph = test_graph();
        let output = run_delegation_plan(
            plan,
            &SchedulerConfig::default(),
            Arc::new(AlwaysAddsOneStep),
            graph.clone(),
            "goal",
            Arc::new(NullSink),
            CancelToken::never(),
        )
        .await
        .unwrap();

        assert_eq!(output.results.len(), 2);
        assert_eq!(output.combine_results.len(), 1);
        assert!(output.combine_errors.is_empty());

        let g = graph.lock().await;
        assert_eq!(g.root_ids().len(), 1);
    }

    #[tokio::test]
    async fn an_undeclared_combine_input_fails_validation_before_any_work_starts() {
        let plan = DelegationPlan {
            nodes: vec![PlanNode::Combine {
                id: "c1".into(),
                depends_on: vec![],
                inputs: vec!["ghost".into()],
                operator: Operator::Union,
                display_name: None,
                upstream: None,
                downstream: None,
            }],
        };

        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.code, ErrorCode::DelegationPlanInvalid);
    }

    #[tokio::test]
    async fn a_combine_whose_input_never_produced_a_step_is_a_missing_combine_inputs_error() {
        let t1 = TaskResult {
            id: "t1".into(),
            task: "find A".into(),
            kind: PlanNodeKind::Task,
            steps: vec![],
            subtree_root: None,
            notes: TaskNotes::NoSteps,
            errors: vec!["nothing found".to_string()],
            contract_violation: false,
        };
        let mut results = HashMap::new();
        results.insert("t1".to_string(), t1);

        let graph = test_graph();
        let result = materialize_combine(
            "c1",
            &["t1".to_string()],
            Operator::Union,
            None,
            graph.as_ref(),
            &results,
        )
        .await;

        assert!(!result.errors.is_empty());
        assert!(result.errors[0].contains("MISSING_COMBINE_INPUTS"));
        assert_eq!(result.notes, TaskNotes::NoSteps);
    }

    #[test]
    fn a_cycle_is_rejected_without_starting_any_work() {
        let plan = DelegationPlan {
            nodes: vec![
                PlanNode::Task {
                    id: "t1".into(),
                    depends_on: vec!["t2".into()],
                    task: "a".into(),
                    hint: None,
                    context: None,
                },
                PlanNode::Task {
                    id: "t2".into(),
                    depends_on: vec!["t1".into()],
                    task: "b".into(),
                    hint: None,
                    context: None,
                },
            ],
        };
        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.code, ErrorCode::DelegationPlanInvalid);
    }
}
