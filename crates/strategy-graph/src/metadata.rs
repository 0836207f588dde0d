use strategy_types::{Operator, StepId, StepNode};

/// Cached compilation view of a graph's single output root: record type plus
/// a derived name/description (§3 `currentStrategy`). Recomputed on demand
/// and invalidated by every mutation rather than kept incrementally up to
/// date — the same role `_derive_strategy_name`/`_build_graph_snapshot`
/// played in the original service, collapsed into one small struct here.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyMetadata {
    pub record_type: Option<String>,
    pub root_step_id: Option<StepId>,
    pub name: String,
    pub description: String,
}

impl StrategyMetadata {
    /// Derive a human-readable name/description from the graph's shape when
    /// the caller hasn't supplied one. A single leaf is named after its
    /// search; a combine is named after its operator's short prose with the
    /// two operand labels threaded in, recursively, up to a shallow depth to
    /// keep the derived text readable for deep graphs.
    pub fn derive(record_type: Option<String>, root_step_id: Option<StepId>, steps: &[StepNode]) -> Self {
        let name = match &root_step_id {
            Some(id) => describe_step(id, steps, 0),
            None => "Empty strategy".to_string(),
        };
        let description = name.clone();
        Self {
            record_type,
            root_step_id,
            name,
            description,
        }
    }
}

fn find<'a>(id: &StepId, steps: &'a [StepNode]) -> Option<&'a StepNode> {
    steps.iter().find(|s| &s.id == id)
}

fn describe_step(id: &StepId, steps: &[StepNode], depth: u32) -> String {
    let Some(step) = find(id, steps) else {
        return id.to_string();
    };
    if let Some(display) = &step.display_name {
        return display.clone();
    }
    match step.operator {
        Some(op) => {
            if depth >= 3 {
                return describe_operator_shallow(op);
            }
            let primary = step
                .primary_input
                .as_ref()
                .map(|p| describe_step(p, steps, depth + 1))
                .unwrap_or_default();
            let secondary = step
                .secondary_input
                .as_ref()
                .map(|s| describe_step(s, steps, depth + 1))
                .unwrap_or_default();
            format!("{primary} {} {secondary}", op.explain())
        }
        None => step.display_label(),
    }
}

fn describe_operator_shallow(op: Operator) -> String {
    format!("a {}", op.explain())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn leaf(id: &str, search_name: &str) -> StepNode {
        StepNode {
            id: StepId::new(id),
            search_name: Some(search_name.to_string()),
            parameters: BTreeMap::new(),
            primary_input: None,
            secondary_input: None,
            operator: None,
            colocation_params: None,
            display_name: None,
            filters: vec![],
            analyses: vec![],
            reports: vec![],
            external_step_id: None,
        }
    }

    fn combine(id: &str, primary: &str, secondary: &str, op: Operator) -> StepNode {
        StepNode {
            id: StepId::new(id),
            search_name: None,
            parameters: BTreeMap::new(),
            primary_input: Some(StepId::new(primary)),
            secondary_input: Some(StepId::new(secondary)),
            operator: Some(op),
            colocation_params: None,
            display_name: None,
            filters: vec![],
            analyses: vec![],
            reports: vec![],
            external_step_id: None,
        }
    }

    #[test]
    fn derives_name_from_nested_combine_prose() {
        let steps = vec![
            leaf("a", "A"),
            leaf("b", "B"),
            leaf("c", "C"),
            combine("inner", "a", "b", Operator::Intersect),
            combine("root", "inner", "c", Operator::Intersect),
        ];
        let metadata = StrategyMetadata::derive(Some("gene".to_string()), Some(StepId::new("root")), &steps);
        insta::assert_snapshot!(metadata.name, @"A intersection B intersection C");
        assert_eq!(metadata.description, metadata.name);
    }

    #[test]
    fn leaf_with_a_display_name_wins_over_its_search_name() {
        let mut a = leaf("a", "GeneByLocation");
        a.display_name = Some("Chr1 genes".to_string());
        let metadata = StrategyMetadata::derive(None, Some(StepId::new("a")), &[a]);
        insta::assert_snapshot!(metadata.name, @"Chr1 genes");
    }

    #[test]
    fn empty_strategy_has_a_fixed_placeholder_name() {
        let metadata = StrategyMetadata::derive(None, None, &[]);
        insta::assert_snapshot!(metadata.name, @"Empty strategy");
    }
}
