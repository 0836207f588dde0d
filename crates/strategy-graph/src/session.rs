use std::collections::HashMap;

use strategy_types::GraphId;

use crate::StrategyGraph;

/// Per-conversation container that owns the graph(s) belonging to one
/// strategy session (§3 `StrategySession`, §4.7). Most conversations have
/// exactly one graph; `active_graph_id` is the convenience default that
/// `get_graph(None)` resolves to.
#[derive(Debug)]
pub struct StrategySession {
    site_id: String,
    graphs: HashMap<GraphId, StrategyGraph>,
    active_graph_id: Option<GraphId>,
    history_capacity: usize,
}

impl StrategySession {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self::with_history_capacity(site_id, crate::DEFAULT_HISTORY_CAPACITY)
    }

    /// Same as [`Self::new`], but every graph this session creates gets
    /// `history_capacity` as its undo-stack depth instead of
    /// [`crate::DEFAULT_HISTORY_CAPACITY`] — the vehicle for
    /// `RuntimeConfig::undo_history_capacity` to actually reach the graphs
    /// it claims to configure.
    pub fn with_history_capacity(site_id: impl Into<String>, history_capacity: usize) -> Self {
        Self {
            site_id: site_id.into(),
            graphs: HashMap::new(),
            active_graph_id: None,
            history_capacity,
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Create a new graph, making it the active graph if none was set yet.
    /// `id` defaults to a fresh random graph id when not supplied.
    pub fn create_graph(
        &mut self,
        name: impl Into<String>,
        record_type: Option<String>,
        id: Option<GraphId>,
    ) -> GraphId {
        let id = id.unwrap_or_else(strategy_core::ids::new_graph_id);
        let graph = StrategyGraph::with_history_capacity(id.clone(), name, record_type, self.history_capacity);
        self.graphs.insert(id.clone(), graph);
        if self.active_graph_id.is_none() {
            self.active_graph_id = Some(id.clone());
        }
        id
    }

    /// Resolve the active graph when `id` is `None`, otherwise the graph
    /// named by `id` (§3 `getGraph(id|null)`).
    pub fn get_graph(&self, id: Option<&GraphId>) -> Option<&StrategyGraph> {
        match id.or(self.active_graph_id.as_ref()) {
            Some(id) => self.graphs.get(id),
            None => None,
        }
    }

    pub fn get_graph_mut(&mut self, id: Option<&GraphId>) -> Option<&mut StrategyGraph> {
        let id = id.cloned().or_else(|| self.active_graph_id.clone())?;
        self.graphs.get_mut(&id)
    }

    pub fn list_graphs(&self) -> Vec<&StrategyGraph> {
        self.graphs.values().collect()
    }

    pub fn delete_graph(&mut self, id: &GraphId) -> bool {
        let removed = self.graphs.remove(id).is_some();
        if removed && self.active_graph_id.as_ref() == Some(id) {
            self.active_graph_id = self.graphs.keys().next().cloned();
        }
        removed
    }

    pub fn active_graph_id(&self) -> Option<&GraphId> {
        self.active_graph_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_created_graph_becomes_active() {
        let mut session = StrategySession::new("site-1");
        let id = session.create_graph("My strategy", Some("gene".into()), None);
        assert_eq!(session.active_graph_id(), Some(&id));
        assert!(session.get_graph(None).is_some());
        assert!(session.get_graph(Some(&id)).is_some());
    }

    #[test]
    fn with_history_capacity_bounds_every_graph_the_session_creates() {
        use crate::NewStep;

        let mut session = StrategySession::with_history_capacity("site-1", 2);
        let id = session.create_graph("A", None, None);
        let graph = session.get_graph_mut(Some(&id)).unwrap();
        for name in ["one", "two", "three"] {
            graph.add_step(NewStep::leaf(name)).unwrap();
        }

        // 3 mutations pushed a pre-image each, but capacity 2 evicts the
        // oldest, so only 2 undos are available.
        assert!(graph.undo());
        assert!(graph.undo());
        assert!(!graph.undo());
    }

    #[test]
    fn deleting_active_graph_falls_back_to_another() {
        let mut session = StrategySession::new("site-1");
        let a = session.create_graph("A", None, None);
        let b = session.create_graph("B", None, None);
        session.delete_graph(&a);
        assert_eq!(session.active_graph_id(), Some(&b));
        assert!(session.get_graph(Some(&a)).is_none());
    }
}
