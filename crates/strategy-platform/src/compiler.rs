use std::collections::HashMap;

use strategy_core::cancel::CancelToken;
use strategy_graph::StrategyGraph;
use strategy_types::{Error, ErrorCode, Result, StepId, StepKind};

use crate::client::PlatformClient;
use crate::models::StepTree;

/// Result of compiling a single-output graph into a pushable external tree
/// (§4.2 `compile` contract).
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub external_steps: Vec<(StepId, i64)>,
    pub root_external_step_id: i64,
    pub step_tree: StepTree,
}

/// Turn a single-output [`StrategyGraph`] into a pushable tree for the
/// external platform and assign external step ids (§4.2).
pub async fn compile(
    graph: &StrategyGraph,
    client: &dyn PlatformClient,
    cancel: &CancelToken,
) -> Result<CompileOutput> {
    let roots = graph.root_ids();
    let root = match roots.len() {
        0 => return Err(Error::new(ErrorCode::NoRoots, "graph has no steps to compile")),
        1 => roots.into_iter().next().unwrap(),
        _ => {
            return Err(Error::new(
                ErrorCode::MultipleRoots,
                "graph must have exactly one root to compile",
            ))
        }
    };

    let record_type = graph.record_type().unwrap_or_default().to_string();
    let order = post_order(graph, &root);

    let mut external_ids: HashMap<StepId, i64> = HashMap::new();
    for id in &order {
        let step = graph
            .get_step(id)
            .ok_or_else(|| Error::new(ErrorCode::StepNotFound, format!("step {id} not found")))?;
        let search_name = step.search_name.clone().unwrap_or_default();
        // Parameters are already strings on the graph (I7); any richer type
        // a caller supplied was normalized before the step was ever added.
        let parameters = step.parameters.clone();

        let external_id = match step.kind() {
            StepKind::Leaf => client
                .create_step(&search_name, parameters, step.display_name.as_deref(), cancel)
                .await
                .map_err(Error::from)?,
            StepKind::Transform => {
                let input_external = *external_ids
                    .get(step.primary_input.as_ref().expect("transform has primary input"))
                    .expect("dependency compiled before dependent in post-order");
                client
                    .create_transform_step(input_external, &search_name, parameters, cancel)
                    .await
                    .map_err(Error::from)?
            }
            StepKind::Combine => {
                let operator = step.operator.expect("combine step always carries an operator");
                client
                    .create_combined_step(&record_type, operator, cancel)
                    .await
                    .map_err(Error::from)?
            }
        };
        external_ids.insert(id.clone(), external_id);

        for filter in &step.filters {
            apply_attachment(client, external_id, filter, cancel).await?;
        }
        for analysis in &step.analyses {
            apply_attachment(client, external_id, analysis, cancel).await?;
        }
        for report in &step.reports {
            apply_attachment(client, external_id, report, cancel).await?;
        }
    }

    let step_tree = build_tree(graph, &root, &external_ids);
    let root_external_step_id = external_ids[&root];
    let mut external_steps: Vec<(StepId, i64)> = external_ids.into_iter().collect();
    external_steps.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(CompileOutput {
        external_steps,
        root_external_step_id,
        step_tree,
    })
}

async fn apply_attachment(
    client: &dyn PlatformClient,
    external_step_id: i64,
    attachment: &strategy_types::Attachment,
    cancel: &CancelToken,
) -> Result<()> {
    match attachment {
        strategy_types::Attachment::Filter { name, value, disabled } => {
            if *disabled {
                client
                    .delete_step_filter(external_step_id, name, cancel)
                    .await
                    .map_err(Error::from)?;
            } else {
                client
                    .set_step_filter(external_step_id, name, value.clone(), cancel)
                    .await
                    .map_err(Error::from)?;
            }
        }
        strategy_types::Attachment::Analysis { name, params } => {
            client
                .run_step_analysis(external_step_id, name, params.clone(), cancel)
                .await
                .map_err(Error::from)?;
        }
        strategy_types::Attachment::Report { name, config } => {
            client
                .run_step_report(external_step_id, name, config.clone(), cancel)
                .await
                .map_err(Error::from)?;
        }
    }
    Ok(())
}

/// Children before parents: every step is compiled only after both of its
/// inputs already have external ids.
fn post_order(graph: &StrategyGraph, root: &StepId) -> Vec<StepId> {
    let mut visited = std::collections::HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(root.clone(), false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if !visited.insert(id.clone()) {
            continue;
        }
        stack.push((id.clone(), true));
        if let Some(step) = graph.get_step(&id) {
            if let Some(secondary) = &step.secondary_input {
                stack.push((secondary.clone(), false));
            }
            if let Some(primary) = &step.primary_input {
                stack.push((primary.clone(), false));
            }
        }
    }
    order
}

fn build_tree(graph: &StrategyGraph, id: &StepId, external_ids: &HashMap<StepId, i64>) -> StepTree {
    let step = graph.get_step(id).expect("step exists for a compiled id");
    StepTree {
        step_id: external_ids[id],
        primary_input: step
            .primary_input
            .as_ref()
            .map(|p| Box::new(build_tree(graph, p, external_ids))),
        secondary_input: step
            .secondary_input
            .as_ref()
            .map(|s| Box::new(build_tree(graph, s, external_ids))),
    }
}
