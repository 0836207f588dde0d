use std::collections::{HashSet, VecDeque};

use strategy_types::{
    Edge, EdgeKind, Error, ErrorCode, GraphId, Operator, Result, StepId, StepKind, StepNode,
    StepPatch, StrategySnapshot,
};

use crate::metadata::StrategyMetadata;
use crate::NewStep;

/// How many prior `steps` snapshots the undo stack retains (I8). The design
/// notes call for "≥20 entries"; this is generous for the small graphs (≤50
/// steps) the core is meant to hold in memory.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct HistoryEntry {
    steps: Vec<StepNode>,
    last_step_id: Option<StepId>,
}

/// An in-memory strategy DAG: an ordered set of [`StepNode`]s plus undo
/// history (§3 `StrategyGraph`, §4.1).
///
/// Steps are kept as a plain `Vec` in insertion order rather than an id-keyed
/// map. Graphs are small (design notes: typically ≤ 50 steps), so linear
/// scans for lookup are simpler and cheaper than maintaining a second index
/// in lockstep with undo snapshots.
#[derive(Debug, Clone)]
pub struct StrategyGraph {
    id: GraphId,
    name: String,
    record_type: Option<String>,
    steps: Vec<StepNode>,
    last_step_id: Option<StepId>,
    history: VecDeque<HistoryEntry>,
    history_capacity: usize,
}

impl StrategyGraph {
    pub fn new(id: GraphId, name: impl Into<String>, record_type: Option<String>) -> Self {
        Self::with_history_capacity(id, name, record_type, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(
        id: GraphId,
        name: impl Into<String>,
        record_type: Option<String>,
        history_capacity: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            record_type,
            steps: Vec::new(),
            last_step_id: None,
            history: VecDeque::new(),
            history_capacity,
        }
    }

    pub fn id(&self) -> &GraphId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    pub fn last_step_id(&self) -> Option<&StepId> {
        self.last_step_id.as_ref()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn position(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    pub fn get_step(&self, id: &StepId) -> Option<&StepNode> {
        self.steps.iter().find(|s| &s.id == id)
    }

    fn push_history(&mut self) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            steps: self.steps.clone(),
            last_step_id: self.last_step_id.clone(),
        });
    }

    /// Restore the previous `steps`/`lastStepId` snapshot (I8, P4). Returns
    /// `true` if a snapshot was actually restored.
    pub fn undo(&mut self) -> bool {
        match self.history.pop_back() {
            Some(entry) => {
                self.steps = entry.steps;
                self.last_step_id = entry.last_step_id;
                true
            }
            None => false,
        }
    }

    /// Ids not referenced as an input by any other step, in insertion order
    /// (§3 "Output"/"root" steps, §4.1 `rootIds`).
    pub fn root_ids(&self) -> Vec<StepId> {
        let referenced = self.referenced_ids();
        self.steps
            .iter()
            .filter(|s| !referenced.contains(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }

    fn referenced_ids(&self) -> HashSet<StepId> {
        let mut referenced = HashSet::new();
        for step in &self.steps {
            if let Some(p) = &step.primary_input {
                referenced.insert(p.clone());
            }
            if let Some(s) = &step.secondary_input {
                referenced.insert(s.clone());
            }
        }
        referenced
    }

    fn is_root(&self, id: &StepId, referenced: &HashSet<StepId>) -> bool {
        !referenced.contains(id)
    }

    /// Validate the input/operator shape of a prospective step against I2,
    /// returning its derived kind on success.
    fn validate_shape(new: &NewStep) -> Result<StepKind> {
        match (
            new.primary_input.is_some(),
            new.secondary_input.is_some(),
            new.operator.is_some(),
        ) {
            (true, true, true) => Ok(StepKind::Combine),
            (true, false, false) => Ok(StepKind::Transform),
            (false, false, false) => Ok(StepKind::Leaf),
            _ => Err(Error::new(
                ErrorCode::InvalidKind,
                "a step must have neither input (leaf), only a primary input (transform), \
                 or both inputs and an operator (combine)",
            )),
        }
    }

    /// Add a fully-populated step (§4.1 `addStep`). Enforces I1 (input refs
    /// exist), I2 (shape), I3 (acyclicity — structurally guaranteed since a
    /// fresh id cannot yet be referenced by any existing step, but checked
    /// anyway for defense against future patch-driven rewiring), and I4
    /// (combine operands must be current subtree roots).
    pub fn add_step(&mut self, new: NewStep) -> Result<StepId> {
        let kind = Self::validate_shape(&new)?;

        for input in [&new.primary_input, &new.secondary_input].into_iter().flatten() {
            if self.get_step(input).is_none() {
                return Err(Error::new(
                    ErrorCode::InvalidInputRef,
                    format!("input step {input} does not exist in this graph"),
                ));
            }
        }

        if kind == StepKind::Combine {
            let referenced = self.referenced_ids();
            for input in [&new.primary_input, &new.secondary_input].into_iter().flatten() {
                if !self.is_root(input, &referenced) {
                    return Err(Error::new(
                        ErrorCode::InvalidInputRef,
                        format!("combine operand {input} is not a current subtree root"),
                    ));
                }
            }
        }

        let id = strategy_core::ids::new_step_id();
        let step = StepNode {
            id: id.clone(),
            search_name: new.search_name,
            parameters: new.parameters,
            primary_input: new.primary_input,
            secondary_input: new.secondary_input,
            operator: new.operator,
            colocation_params: new.colocation_params,
            display_name: new.display_name,
            filters: new.filters,
            analyses: new.analyses,
            reports: new.reports,
            external_step_id: None,
        };

        self.push_history();
        self.steps.push(step);
        self.last_step_id = Some(id.clone());
        Ok(id)
    }

    /// Apply a patch to an existing step (§4.1 `updateStep`). Input
    /// references are immutable once a step exists (there is no field for
    /// them on [`StepPatch`]); only search name, parameters, operator,
    /// display name, and colocation params may change.
    pub fn update_step(&mut self, id: &StepId, patch: StepPatch) -> Result<()> {
        let pos = self
            .position(id)
            .ok_or_else(|| Error::new(ErrorCode::StepNotFound, format!("step {id} not found")))?;

        if let Some(operator) = patch.operator {
            let has_both_inputs =
                self.steps[pos].primary_input.is_some() && self.steps[pos].secondary_input.is_some();
            if !has_both_inputs {
                return Err(Error::new(
                    ErrorCode::InvalidKind,
                    "cannot set an operator on a step without both inputs",
                ));
            }
            let _ = operator;
        }

        self.push_history();
        let step = &mut self.steps[pos];
        if let Some(search_name) = patch.search_name {
            step.search_name = Some(search_name);
        }
        if let Some(parameters) = patch.parameters {
            step.parameters = parameters;
        }
        if let Some(operator) = patch.operator {
            step.operator = Some(operator);
        }
        if let Some(display_name) = patch.display_name {
            step.display_name = Some(display_name);
        }
        if let Some(colocation_params) = patch.colocation_params {
            step.colocation_params = Some(colocation_params);
        }
        Ok(())
    }

    pub fn rename_step(&mut self, id: &StepId, name: impl Into<String>) -> Result<()> {
        let pos = self
            .position(id)
            .ok_or_else(|| Error::new(ErrorCode::StepNotFound, format!("step {id} not found")))?;
        self.push_history();
        self.steps[pos].display_name = Some(name.into());
        Ok(())
    }

    /// Remove `id` and every step transitively referencing it (§4.1
    /// `deleteStep`, P5). Fails `WOULD_EMPTY_GRAPH` rather than silently
    /// clearing the graph; callers that mean to empty it must call
    /// [`StrategyGraph::clear`] explicitly.
    pub fn delete_step(&mut self, id: &StepId) -> Result<Vec<StepId>> {
        if self.position(id).is_none() {
            return Err(Error::new(ErrorCode::StepNotFound, format!("step {id} not found")));
        }

        let doomed = self.cascade_doomed_set(id);
        if doomed.len() == self.steps.len() {
            return Err(Error::new(
                ErrorCode::WouldEmptyGraph,
                "deleting this step would remove every step in the graph; use clear() instead",
            ));
        }

        self.push_history();
        self.steps.retain(|s| !doomed.contains(&s.id));
        if self
            .last_step_id
            .as_ref()
            .map(|last| doomed.contains(last))
            .unwrap_or(false)
        {
            self.last_step_id = self.steps.last().map(|s| s.id.clone());
        }

        let mut removed: Vec<StepId> = doomed.into_iter().collect();
        removed.sort();
        Ok(removed)
    }

    /// Fixed-point expansion of the doomed set: start with `id`, then
    /// repeatedly add any step whose primary or secondary input is already
    /// doomed, until a pass adds nothing new.
    fn cascade_doomed_set(&self, id: &StepId) -> HashSet<StepId> {
        let mut doomed = HashSet::new();
        doomed.insert(id.clone());
        loop {
            let mut grew = false;
            for step in &self.steps {
                if doomed.contains(&step.id) {
                    continue;
                }
                let depends_on_doomed = step
                    .primary_input
                    .as_ref()
                    .is_some_and(|p| doomed.contains(p))
                    || step
                        .secondary_input
                        .as_ref()
                        .is_some_and(|s| doomed.contains(s));
                if depends_on_doomed {
                    doomed.insert(step.id.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        doomed
    }

    /// Remove every step in the graph (§4.1 `clear`). Requires
    /// `confirm == true`; this is the only sanctioned way to empty a
    /// non-empty graph.
    pub fn clear(&mut self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(Error::new(
                ErrorCode::ConfirmationRequired,
                "clear() requires confirm=true",
            ));
        }
        self.push_history();
        self.steps.clear();
        self.last_step_id = None;
        Ok(())
    }

    /// If the graph has more than one root, fold them pairwise into combine
    /// steps using `operator`, left to right in `rootIds()` order, and
    /// return the id of the resulting single root (§4.1 `ensureSingleOutput`).
    /// The supplied `display_name` is applied only to the final fold combine.
    pub fn ensure_single_output(
        &mut self,
        operator: Operator,
        display_name: Option<String>,
    ) -> Result<StepId> {
        let roots = self.root_ids();
        let mut iter = roots.into_iter();
        let Some(first) = iter.next() else {
            return Err(Error::new(ErrorCode::NoRoots, "graph has no steps"));
        };

        let mut current = first;
        let mut rest: Vec<StepId> = iter.collect();
        if rest.is_empty() {
            return Ok(current);
        }

        while !rest.is_empty() {
            let next = rest.remove(0);
            let is_final = rest.is_empty();
            let mut new_step = NewStep::combine(current.clone(), next, operator);
            new_step.display_name = if is_final { display_name.clone() } else { None };
            current = self.add_step(new_step)?;
        }
        Ok(current)
    }

    /// Serializable form of the graph (§4.1 `snapshot`).
    pub fn snapshot(&self) -> StrategySnapshot {
        let roots = self.root_ids();
        let root_step_id = if roots.len() == 1 {
            roots.into_iter().next()
        } else {
            None
        };

        let mut edges = Vec::new();
        for step in &self.steps {
            if let Some(p) = &step.primary_input {
                edges.push(Edge {
                    source_id: p.clone(),
                    target_id: step.id.clone(),
                    kind: EdgeKind::Primary,
                });
            }
            if let Some(s) = &step.secondary_input {
                edges.push(Edge {
                    source_id: s.clone(),
                    target_id: step.id.clone(),
                    kind: EdgeKind::Secondary,
                });
            }
        }

        StrategySnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            record_type: self.record_type.clone(),
            root_step_id,
            steps: self.steps.clone(),
            edges,
        }
    }

    /// Derive the cached name/description view of the current single-root
    /// state (§3 `currentStrategy`). Recomputed fresh each call rather than
    /// memoized — see [`StrategyMetadata`].
    pub fn metadata(&self) -> StrategyMetadata {
        let roots = self.root_ids();
        let root = if roots.len() == 1 {
            roots.into_iter().next()
        } else {
            None
        };
        StrategyMetadata::derive(self.record_type.clone(), root, &self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn graph() -> StrategyGraph {
        StrategyGraph::new(GraphId::new("g1"), "Test strategy", Some("gene".into()))
    }

    #[test]
    fn s1_combine_an_existing_leaf() {
        let mut g = graph();
        let a = g
            .add_step(NewStep::leaf("S1").with_parameters(BTreeMap::from([("p".into(), "1".into())])))
            .unwrap();
        let b = g
            .add_step(NewStep::leaf("S2").with_parameters(BTreeMap::from([("q".into(), "2".into())])))
            .unwrap();
        let combine = g
            .add_step(NewStep::combine(a.clone(), b, Operator::Intersect))
            .unwrap();

        assert_eq!(g.root_ids(), vec![combine.clone()]);
        assert_eq!(g.get_step(&combine).unwrap().kind(), StepKind::Combine);

        let removed = g.delete_step(&a).unwrap();
        assert!(removed.contains(&a));
        assert!(removed.contains(&combine));
        assert!(g.get_step(&combine).is_none());
    }

    #[test]
    fn s2_undo_after_rename() {
        let mut g = graph();
        let x = g.add_step(NewStep::leaf("S1")).unwrap();
        g.rename_step(&x, "A").unwrap();
        g.rename_step(&x, "B").unwrap();
        assert_eq!(g.get_step(&x).unwrap().display_name.as_deref(), Some("B"));
        assert!(g.undo());
        assert_eq!(g.get_step(&x).unwrap().display_name.as_deref(), Some("A"));
    }

    #[test]
    fn s3_ensure_single_output_left_fold() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("A")).unwrap();
        let b = g.add_step(NewStep::leaf("B")).unwrap();
        let c = g.add_step(NewStep::leaf("C")).unwrap();

        let root = g.ensure_single_output(Operator::Intersect, None).unwrap();
        assert_eq!(g.root_ids(), vec![root.clone()]);

        let root_step = g.get_step(&root).unwrap();
        assert_eq!(root_step.secondary_input.as_ref(), Some(&c));
        let inner = g.get_step(root_step.primary_input.as_ref().unwrap()).unwrap();
        assert_eq!(inner.primary_input.as_ref(), Some(&a));
        assert_eq!(inner.secondary_input.as_ref(), Some(&b));
    }

    #[test]
    fn p1_reference_integrity_rejects_unknown_input() {
        let mut g = graph();
        let err = g
            .add_step(NewStep::transform("T1", StepId::new("missing")))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInputRef);
    }

    #[test]
    fn p2_kind_structure_rejects_malformed_shape() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("S1")).unwrap();
        let malformed = NewStep {
            secondary_input: Some(a),
            ..Default::default()
        };
        let err = g.add_step(malformed).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidKind);
    }

    #[test]
    fn p4_undo_round_trip_is_byte_identical() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("S1")).unwrap();
        let before = g.snapshot();
        g.rename_step(&a, "Renamed").unwrap();
        assert!(g.undo());
        let after = g.snapshot();
        assert_eq!(before, after);
    }

    #[test]
    fn p5_delete_cascade_is_complete() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("S1")).unwrap();
        let t = g.add_step(NewStep::transform("T1", a.clone())).unwrap();
        let b = g.add_step(NewStep::leaf("S2")).unwrap();
        let combine = g.add_step(NewStep::combine(t, b, Operator::Union)).unwrap();

        g.delete_step(&a).unwrap();
        assert!(g.get_step(&combine).is_none());
        assert!(g.get_step(&b).is_some());
    }

    #[test]
    fn p6_ensure_single_output_yields_one_root_or_fails() {
        let mut g = graph();
        let err = g.ensure_single_output(Operator::Union, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRoots);

        g.add_step(NewStep::leaf("S1")).unwrap();
        let root = g.ensure_single_output(Operator::Union, None).unwrap();
        assert_eq!(g.root_ids(), vec![root]);
    }

    #[test]
    fn delete_would_empty_graph_is_rejected() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("S1")).unwrap();
        let err = g.delete_step(&a).unwrap_err();
        assert_eq!(err.code, ErrorCode::WouldEmptyGraph);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn clear_requires_confirmation() {
        let mut g = graph();
        g.add_step(NewStep::leaf("S1")).unwrap();
        let err = g.clear(false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfirmationRequired);
        g.clear(true).unwrap();
        assert!(g.is_empty());
    }

    #[test]
    fn combine_operand_must_be_current_root() {
        let mut g = graph();
        let a = g.add_step(NewStep::leaf("S1")).unwrap();
        let b = g.add_step(NewStep::leaf("S2")).unwrap();
        let c = g.add_step(NewStep::leaf("S3")).unwrap();
        let combine = g.add_step(NewStep::combine(a.clone(), b, Operator::Union)).unwrap();

        // `a` is no longer a root now that it feeds `combine`.
        let err = g
            .add_step(NewStep::combine(a, c, Operator::Intersect))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInputRef);
        assert!(g.get_step(&combine).is_some());
    }
}
