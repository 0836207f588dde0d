use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use strategy_core::cancel::CancelToken;
use strategy_platform::{
    CreateStrategyRequest, PlatformClient, RecordTypeInfo, SearchDetail, SearchSummary, StepTree,
};
use strategy_platform::PlatformResult as Result;
use strategy_types::Operator;
use tokio::sync::Mutex;

/// In-memory `PlatformClient` double: every `create_*` call hands out a
/// fresh monotonically-increasing step id rather than making an HTTP call,
/// so the compiler/scheduler/adapter boundary can be exercised without a
/// live platform (§6.1 is the contract this stands in for).
pub struct ScriptedPlatformClient {
    record_types: Vec<RecordTypeInfo>,
    searches: BTreeMap<String, Vec<SearchSummary>>,
    search_details: BTreeMap<(String, String), SearchDetail>,
    next_step_id: AtomicI64,
    next_strategy_id: AtomicI64,
    strategies: Mutex<BTreeMap<i64, StepTree>>,
}

impl ScriptedPlatformClient {
    /// A client preloaded with one record type (`Gene`) and one boolean
    /// combine search (`boolean_question`) exposing the
    /// `bq_left_op`/`bq_right_op`/`bq_operator` parameters §4.2 discovery
    /// scans for.
    pub fn with_gene_record_type() -> Self {
        let boolean_search = SearchSummary {
            url_segment: "boolean_question".to_string(),
            display_name: "Combine".to_string(),
            description: String::new(),
        };
        let record_type = RecordTypeInfo {
            name: "gene".to_string(),
            display_name: "Gene".to_string(),
            description: String::new(),
            searches: vec![boolean_search.clone()],
        };
        let boolean_detail = SearchDetail {
            url_segment: "boolean_question".to_string(),
            display_name: "Combine".to_string(),
            description: String::new(),
            param_names: vec![
                "bq_left_op".to_string(),
                "bq_right_op".to_string(),
                "bq_operator".to_string(),
            ],
            parameters: Vec::new(),
        };

        let mut searches = BTreeMap::new();
        searches.insert("gene".to_string(), vec![boolean_search]);
        let mut search_details = BTreeMap::new();
        search_details.insert(("gene".to_string(), "boolean_question".to_string()), boolean_detail);

        Self {
            record_types: vec![record_type],
            searches,
            search_details,
            next_step_id: AtomicI64::new(1),
            next_strategy_id: AtomicI64::new(1),
            strategies: Mutex::new(BTreeMap::new()),
        }
    }

    fn next_step(&self) -> i64 {
        self.next_step_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for ScriptedPlatformClient {
    async fn list_record_types(&self, _cancel: &CancelToken) -> Result<Vec<RecordTypeInfo>> {
        Ok(self.record_types.clone())
    }

    async fn list_searches(&self, record_type: &str, _cancel: &CancelToken) -> Result<Vec<SearchSummary>> {
        Ok(self.searches.get(record_type).cloned().unwrap_or_default())
    }

    async fn get_search_details(
        &self,
        record_type: &str,
        search: &str,
        _cancel: &CancelToken,
    ) -> Result<SearchDetail> {
        self.search_details
            .get(&(record_type.to_string(), search.to_string()))
            .cloned()
            .ok_or_else(|| strategy_platform::WdkError::Status {
                status: 404,
                message: format!("no such search {search} for {record_type}"),
            })
    }

    async fn create_step(
        &self,
        _search_name: &str,
        _parameters: BTreeMap<String, String>,
        _custom_name: Option<&str>,
        _cancel: &CancelToken,
    ) -> Result<i64> {
        Ok(self.next_step())
    }

    async fn create_transform_step(
        &self,
        _input_step_id: i64,
        _search_name: &str,
        _parameters: BTreeMap<String, String>,
        _cancel: &CancelToken,
    ) -> Result<i64> {
        Ok(self.next_step())
    }

    async fn create_combined_step(
        &self,
        _record_type: &str,
        _operator: Operator,
        _cancel: &CancelToken,
    ) -> Result<i64> {
        Ok(self.next_step())
    }

    async fn create_strategy(&self, req: CreateStrategyRequest, _cancel: &CancelToken) -> Result<i64> {
        let id = self.next_strategy_id.fetch_add(1, Ordering::SeqCst);
        self.strategies.lock().await.insert(id, req.step_tree);
        Ok(id)
    }

    async fn update_strategy(&self, id: i64, step_tree: StepTree, _cancel: &CancelToken) -> Result<()> {
        self.strategies.lock().await.insert(id, step_tree);
        Ok(())
    }

    async fn delete_strategy(&self, id: i64, _cancel: &CancelToken) -> Result<()> {
        self.strategies.lock().await.remove(&id);
        Ok(())
    }

    async fn get_strategy(&self, id: i64, _cancel: &CancelToken) -> Result<Value> {
        let strategies = self.strategies.lock().await;
        match strategies.get(&id) {
            Some(tree) => Ok(json!({ "id": id, "stepTree": tree })),
            None => Err(strategy_platform::WdkError::Status { status: 404, message: "not found".into() }),
        }
    }

    async fn list_strategies(&self, _cancel: &CancelToken) -> Result<Vec<Value>> {
        let strategies = self.strategies.lock().await;
        Ok(strategies.keys().map(|id| json!({ "id": id })).collect())
    }

    async fn set_step_filter(&self, _step_id: i64, _name: &str, _value: Value, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    async fn delete_step_filter(&self, _step_id: i64, _name: &str, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    async fn run_step_analysis(
        &self,
        _step_id: i64,
        _name: &str,
        _params: BTreeMap<String, String>,
        _cancel: &CancelToken,
    ) -> Result<Value> {
        Ok(json!({}))
    }

    async fn run_step_report(
        &self,
        _step_id: i64,
        _name: &str,
        _config: Value,
        _cancel: &CancelToken,
    ) -> Result<Value> {
        Ok(json!({}))
    }

    async fn get_step_count(&self, _step_id: i64, _cancel: &CancelToken) -> Result<i64> {
        Ok(0)
    }

    async fn get_step_answer(&self, _step_id: i64, _cancel: &CancelToken) -> Result<Value> {
        Ok(json!({ "records": [] }))
    }

    async fn create_dataset(&self, _ids: Vec<i64>, _cancel: &CancelToken) -> Result<i64> {
        Ok(self.next_step())
    }
}
