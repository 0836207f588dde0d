use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::StepId;

/// Boolean/spatial combine operator (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Intersect,
    Union,
    Minus,
    Rminus,
    Colocate,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Intersect => "INTERSECT",
            Operator::Union => "UNION",
            Operator::Minus => "MINUS",
            Operator::Rminus => "RMINUS",
            Operator::Colocate => "COLOCATE",
        }
    }

    /// Short prose used when a caller hasn't supplied a display name,
    /// mirroring `explain_operation` from the original chatbot service.
    pub fn explain(&self) -> &'static str {
        match self {
            Operator::Intersect => "intersection",
            Operator::Union => "union",
            Operator::Minus => "difference",
            Operator::Rminus => "reverse difference",
            Operator::Colocate => "colocation",
        }
    }
}

/// Upstream/downstream bp window + strand for a COLOCATE combine (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocationParams {
    pub upstream_bp: i64,
    pub downstream_bp: i64,
    pub same_strand: bool,
}

/// One filter/analysis/report attachment on a step (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    Filter {
        name: String,
        value: serde_json::Value,
        #[serde(default)]
        disabled: bool,
    },
    Analysis {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
    Report {
        name: String,
        #[serde(default)]
        config: serde_json::Value,
    },
}

/// The kind of a step, always derived from its input/operator shape (§3 I2),
/// never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Leaf,
    Transform,
    Combine,
}

/// A vertex of the strategy graph (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: StepId,
    pub search_name: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub primary_input: Option<StepId>,
    pub secondary_input: Option<StepId>,
    pub operator: Option<Operator>,
    pub colocation_params: Option<ColocationParams>,
    pub display_name: Option<String>,
    pub filters: Vec<Attachment>,
    pub analyses: Vec<Attachment>,
    pub reports: Vec<Attachment>,
    pub external_step_id: Option<i64>,
}

impl StepNode {
    /// Derive the step's kind from its input/operator shape (I2).
    ///
    /// - combine: both inputs set and an operator.
    /// - transform: only the primary input set, no operator.
    /// - leaf: neither input set.
    ///
    /// Any other combination (e.g. only `secondary_input` set, or an operator
    /// with no inputs) is a construction bug upstream; callers that build
    /// `StepNode` by hand should go through `strategy_graph::StrategyGraph::add_step`,
    /// which rejects such shapes before they ever reach this derivation.
    pub fn kind(&self) -> StepKind {
        match (
            self.primary_input.is_some(),
            self.secondary_input.is_some(),
            self.operator.is_some(),
        ) {
            (true, true, true) => StepKind::Combine,
            (true, false, false) => StepKind::Transform,
            (false, false, false) => StepKind::Leaf,
            _ => StepKind::Combine,
        }
    }

    pub fn display_label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.search_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A patch applied by `StrategyGraph::update_step` (§4.1). `None` fields are
/// left unchanged; this is not the same as clearing a field — there is no
/// operation to unset `operator` or `search_name` once set other than
/// replacing the whole step via delete+recreate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    pub search_name: Option<String>,
    pub parameters: Option<BTreeMap<String, String>>,
    pub operator: Option<Operator>,
    pub display_name: Option<String>,
    pub colocation_params: Option<ColocationParams>,
}

/// Which input role an edge in a `snapshot()` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: StepId,
    pub target_id: StepId,
    pub kind: EdgeKind,
}

/// Serializable snapshot of a `StrategyGraph` (§4.1 `snapshot()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub id: crate::ids::GraphId,
    pub name: String,
    pub record_type: Option<String>,
    /// Set only when the graph has exactly one root (I5).
    pub root_step_id: Option<StepId>,
    pub steps: Vec<StepNode>,
    pub edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_derivation_matches_invariant_i2() {
        let leaf = StepNode {
            id: StepId::new("a"),
            search_name: Some("GeneByLocation".into()),
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
        };
        assert_eq!(leaf.kind(), StepKind::Leaf);

        let transform = StepNode {
            primary_input: Some(StepId::new("a")),
            ..leaf.clone()
        };
        assert_eq!(transform.kind(), StepKind::Transform);

        let combine = StepNode {
            primary_input: Some(StepId::new("a")),
            secondary_input: Some(StepId::new("b")),
            operator: Some(Operator::Intersect),
            ..leaf
        };
        assert_eq!(combine.kind(), StepKind::Combine);
    }
}
