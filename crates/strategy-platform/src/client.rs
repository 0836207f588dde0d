use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strategy_core::cancel::CancelToken;
use strategy_types::Operator;
use tokio::sync::Mutex;

use crate::error::{Result, WdkError};
use crate::models::*;

/// Default soft timeout for adapter calls (§4.3).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);
/// `getStrategy` responses can be large; it gets a longer budget (§4.3).
pub const STRATEGY_TIMEOUT: Duration = Duration::from_secs(180);

/// Typed async client over the external query platform (§4.3, §6.1). Every
/// method here is the retried, deadline-aware operation the rest of the core
/// depends on; trait object so `strategy-testing` can substitute a scripted
/// double without the compiler/scheduler caring which.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_record_types(&self, cancel: &CancelToken) -> Result<Vec<RecordTypeInfo>>;
    async fn list_searches(&self, record_type: &str, cancel: &CancelToken) -> Result<Vec<SearchSummary>>;
    async fn get_search_details(
        &self,
        record_type: &str,
        search: &str,
        cancel: &CancelToken,
    ) -> Result<SearchDetail>;
    async fn create_step(
        &self,
        search_name: &str,
        parameters: BTreeMap<String, String>,
        custom_name: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<i64>;
    async fn create_transform_step(
        &self,
        input_step_id: i64,
        search_name: &str,
        parameters: BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<i64>;
    async fn create_combined_step(
        &self,
        record_type: &str,
        operator: Operator,
        cancel: &CancelToken,
    ) -> Result<i64>;
    async fn create_strategy(&self, req: CreateStrategyRequest, cancel: &CancelToken) -> Result<i64>;
    async fn update_strategy(&self, id: i64, step_tree: StepTree, cancel: &CancelToken) -> Result<()>;
    async fn delete_strategy(&self, id: i64, cancel: &CancelToken) -> Result<()>;
    async fn get_strategy(&self, id: i64, cancel: &CancelToken) -> Result<Value>;
    async fn list_strategies(&self, cancel: &CancelToken) -> Result<Vec<Value>>;
    async fn set_step_filter(
        &self,
        step_id: i64,
        name: &str,
        value: Value,
        cancel: &CancelToken,
    ) -> Result<()>;
    async fn delete_step_filter(&self, step_id: i64, name: &str, cancel: &CancelToken) -> Result<()>;
    async fn run_step_analysis(
        &self,
        step_id: i64,
        name: &str,
        params: BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<Value>;
    async fn run_step_report(
        &self,
        step_id: i64,
        name: &str,
        config: Value,
        cancel: &CancelToken,
    ) -> Result<Value>;
    async fn get_step_count(&self, step_id: i64, cancel: &CancelToken) -> Result<i64>;
    async fn get_step_answer(&self, step_id: i64, cancel: &CancelToken) -> Result<Value>;
    async fn create_dataset(&self, ids: Vec<i64>, cancel: &CancelToken) -> Result<i64>;
}

/// Per-record-type cache of the discovered boolean combine search and its
/// operand/operator parameter names (§4.2 step 2-3), read-mostly and
/// written once per record type under a mutex (§5 "External Adapter ...
/// caches ... guarded by a mutex").
#[derive(Debug, Clone)]
pub struct BooleanSearchInfo {
    pub search_name: String,
    pub left_operand_param: String,
    pub right_operand_param: String,
    pub operator_param: String,
}

/// `reqwest`-backed [`PlatformClient`] with the retry/backoff policy and
/// per-session user-id resolution described in §4.3.
pub struct RetryingClient {
    http: reqwest::Client,
    base_url: String,
    user_id: Mutex<Option<i64>>,
    boolean_search_cache: Mutex<BTreeMap<String, BooleanSearchInfo>>,
    max_attempts: u32,
    soft_timeout: Duration,
    strategy_timeout: Duration,
}

impl RetryingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            user_id: Mutex::new(None),
            boolean_search_cache: Mutex::new(BTreeMap::new()),
            max_attempts: crate::retry::MAX_ATTEMPTS,
            soft_timeout: DEFAULT_TIMEOUT,
            strategy_timeout: STRATEGY_TIMEOUT,
        }
    }

    /// Construct a client whose per-call timeouts come from configuration
    /// (e.g. `RuntimeConfig::adapter_soft_timeout`/`adapter_strategy_timeout`)
    /// rather than the §4.3 defaults.
    pub fn with_timeouts(base_url: impl Into<String>, soft_timeout: Duration, strategy_timeout: Duration) -> Self {
        let mut client = Self::new(base_url);
        client.soft_timeout = soft_timeout;
        client.strategy_timeout = strategy_timeout;
        client
    }

    #[cfg(test)]
    pub fn with_max_attempts(base_url: impl Into<String>, max_attempts: u32) -> Self {
        let mut client = Self::new(base_url);
        client.max_attempts = max_attempts;
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Resolve and cache the concrete user id behind `/users/current`
    /// (§4.3 "Session initialization"). Mutation endpoints are path-scoped
    /// to a concrete user id even when reads accept a placeholder.
    async fn resolve_user_id(&self, cancel: &CancelToken) -> Result<i64> {
        {
            let cached = self.user_id.lock().await;
            if let Some(id) = *cached {
                return Ok(id);
            }
        }
        let current: CurrentUser = self
            .execute(
                self.http.get(self.url("/users/current")),
                self.soft_timeout,
                cancel,
            )
            .await?;
        let mut cached = self.user_id.lock().await;
        *cached = Some(current.id);
        Ok(current.id)
    }

    /// Discover and cache the boolean combine search for `record_type`
    /// (§4.2 steps 2-3) by scanning its searches for the platform's
    /// boolean-search naming convention.
    async fn boolean_search_info(
        &self,
        record_type: &str,
        cancel: &CancelToken,
    ) -> Result<BooleanSearchInfo> {
        {
            let cache = self.boolean_search_cache.lock().await;
            if let Some(info) = cache.get(record_type) {
                return Ok(info.clone());
            }
        }

        let searches = self.list_searches(record_type, cancel).await?;
        let boolean_search = searches
            .iter()
            .find(|s| s.url_segment.starts_with("boolean_"))
            .ok_or_else(|| WdkError::Status {
                status: 0,
                message: format!("no boolean combine search found for record type {record_type}"),
            })?;

        let detail = self
            .get_search_details(record_type, &boolean_search.url_segment, cancel)
            .await?;

        let find_param = |prefix: &str| -> Result<String> {
            detail
                .param_names
                .iter()
                .find(|p| p.starts_with(prefix))
                .cloned()
                .ok_or_else(|| WdkError::Status {
                    status: 0,
                    message: format!("boolean search {} missing {prefix}* parameter", detail.url_segment),
                })
        };

        let info = BooleanSearchInfo {
            search_name: detail.url_segment.clone(),
            left_operand_param: find_param("bq_left_op")?,
            right_operand_param: find_param("bq_right_op")?,
            operator_param: find_param("bq_operator")?,
        };

        let mut cache = self.boolean_search_cache.lock().await;
        cache.insert(record_type.to_string(), info.clone());
        Ok(info)
    }

    /// Send `build`, retrying retryable failures per §4.3, and deserialize
    /// the JSON body into `T`.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        build: reqwest::RequestBuilder,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<T> {
        let response = self.execute_raw(build, timeout, cancel).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| WdkError::Transport(e.to_string()))
    }

    async fn execute_raw(
        &self,
        build: reqwest::RequestBuilder,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<reqwest::Response> {
        let request = build.build().map_err(|e| WdkError::Transport(e.to_string()))?;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = crate::retry::backoff_delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(WdkError::Cancelled),
                }
            }
            if cancel.is_cancelled() {
                return Err(WdkError::Cancelled);
            }

            let attempt_request = request
                .try_clone()
                .ok_or_else(|| WdkError::Transport("request body is not cloneable for retry".into()))?;

            let outcome = tokio::select! {
                result = tokio::time::timeout(timeout, self.http.execute(attempt_request)) => result,
                _ = cancel.cancelled() => return Err(WdkError::Cancelled),
            };

            let response = match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(transport_err)) => {
                    if attempt == self.max_attempts {
                        return Err(WdkError::Transport(transport_err.to_string()));
                    }
                    continue;
                }
                Err(_elapsed) => {
                    if attempt == self.max_attempts {
                        return Err(WdkError::Transport("request timed out".into()));
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(response);
            }
            if crate::retry::is_retryable_status(status) && attempt < self.max_attempts {
                continue;
            }

            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(WdkError::Status { status, message });
        }
        unreachable!("loop always returns on the final attempt")
    }
}

#[async_trait]
impl PlatformClient for RetryingClient {
    async fn list_record_types(&self, cancel: &CancelToken) -> Result<Vec<RecordTypeInfo>> {
        self.execute(
            self.http.get(self.url("/record-types?expanded=true")),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn list_searches(&self, record_type: &str, cancel: &CancelToken) -> Result<Vec<SearchSummary>> {
        self.execute(
            self.http
                .get(self.url(&format!("/record-types/{record_type}/searches"))),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn get_search_details(
        &self,
        record_type: &str,
        search: &str,
        cancel: &CancelToken,
    ) -> Result<SearchDetail> {
        self.execute(
            self.http.get(self.url(&format!(
                "/record-types/{record_type}/searches/{search}?expanded=true"
            ))),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn create_step(
        &self,
        search_name: &str,
        parameters: BTreeMap<String, String>,
        custom_name: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<i64> {
        let user_id = self.resolve_user_id(cancel).await?;
        let body = CreateStepRequest {
            search_name: search_name.to_string(),
            search_config: SearchConfig { parameters },
            custom_name: custom_name.map(str::to_string),
        };
        let response: CreateStepResponse = self
            .execute(
                self.http
                    .post(self.url(&format!("/users/{user_id}/steps")))
                    .json(&body),
                self.soft_timeout,
                cancel,
            )
            .await?;
        Ok(response.id)
    }

    async fn create_transform_step(
        &self,
        input_step_id: i64,
        search_name: &str,
        mut parameters: BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<i64> {
        parameters.insert("input_step_id".to_string(), input_step_id.to_string());
        self.create_step(search_name, parameters, None, cancel).await
    }

    async fn create_combined_step(
        &self,
        record_type: &str,
        operator: Operator,
        cancel: &CancelToken,
    ) -> Result<i64> {
        let info = self.boolean_search_info(record_type, cancel).await?;
        let mut parameters = BTreeMap::new();
        parameters.insert(info.left_operand_param.clone(), String::new());
        parameters.insert(info.right_operand_param.clone(), String::new());
        parameters.insert(info.operator_param.clone(), operator.as_str().to_string());
        self.create_step(&info.search_name, parameters, None, cancel).await
    }

    async fn create_strategy(&self, req: CreateStrategyRequest, cancel: &CancelToken) -> Result<i64> {
        let user_id = self.resolve_user_id(cancel).await?;
        let response: CreateStrategyResponse = self
            .execute(
                self.http
                    .post(self.url(&format!("/users/{user_id}/strategies")))
                    .json(&req),
                self.soft_timeout,
                cancel,
            )
            .await?;
        Ok(response.id)
    }

    async fn update_strategy(&self, id: i64, step_tree: StepTree, cancel: &CancelToken) -> Result<()> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute_raw(
            self.http
                .put(self.url(&format!("/users/{user_id}/strategies/{id}/step-tree")))
                .json(&step_tree),
            self.soft_timeout,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn delete_strategy(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute_raw(
            self.http
                .delete(self.url(&format!("/users/{user_id}/strategies/{id}"))),
            self.soft_timeout,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn get_strategy(&self, id: i64, cancel: &CancelToken) -> Result<Value> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute(
            self.http
                .get(self.url(&format!("/users/{user_id}/strategies/{id}"))),
            self.strategy_timeout,
            cancel,
        )
        .await
    }

    async fn list_strategies(&self, cancel: &CancelToken) -> Result<Vec<Value>> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute(
            self.http
                .get(self.url(&format!("/users/{user_id}/strategies"))),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn set_step_filter(
        &self,
        step_id: i64,
        name: &str,
        value: Value,
        cancel: &CancelToken,
    ) -> Result<()> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute_raw(
            self.http
                .put(self.url(&format!("/users/{user_id}/steps/{step_id}/filters/{name}")))
                .json(&value),
            self.soft_timeout,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn delete_step_filter(&self, step_id: i64, name: &str, cancel: &CancelToken) -> Result<()> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute_raw(
            self.http
                .delete(self.url(&format!("/users/{user_id}/steps/{step_id}/filters/{name}"))),
            self.soft_timeout,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn run_step_analysis(
        &self,
        step_id: i64,
        name: &str,
        params: BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute(
            self.http
                .post(self.url(&format!("/users/{user_id}/steps/{step_id}/analyses/{name}")))
                .json(&params),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn run_step_report(
        &self,
        step_id: i64,
        name: &str,
        config: Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute(
            self.http
                .post(self.url(&format!("/users/{user_id}/steps/{step_id}/reports/{name}")))
                .json(&config),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn get_step_count(&self, step_id: i64, cancel: &CancelToken) -> Result<i64> {
        let user_id = self.resolve_user_id(cancel).await?;
        let body = serde_json::json!({
            "reportConfig": { "pagination": { "offset": 0, "numRecords": 0 } }
        });
        let response: StandardReportResponse = self
            .execute(
                self.http
                    .post(self.url(&format!(
                        "/users/{user_id}/steps/{step_id}/reports/standard"
                    )))
                    .json(&body),
                self.soft_timeout,
                cancel,
            )
            .await?;
        Ok(response.meta.total_count)
    }

    async fn get_step_answer(&self, step_id: i64, cancel: &CancelToken) -> Result<Value> {
        let user_id = self.resolve_user_id(cancel).await?;
        self.execute(
            self.http.post(self.url(&format!(
                "/users/{user_id}/steps/{step_id}/reports/standard"
            ))),
            self.soft_timeout,
            cancel,
        )
        .await
    }

    async fn create_dataset(&self, ids: Vec<i64>, cancel: &CancelToken) -> Result<i64> {
        let user_id = self.resolve_user_id(cancel).await?;
        let body = CreateDatasetRequest {
            source_type: "idList".to_string(),
            source_content: DatasetSourceContent { ids },
        };
        let response: CreateDatasetResponse = self
            .execute(
                self.http
                    .post(self.url(&format!("/users/{user_id}/datasets")))
                    .json(&body),
                self.soft_timeout,
                cancel,
            )
            .await?;
        Ok(response.id)
    }
}
