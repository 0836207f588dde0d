use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `GET /record-types?expanded=...` entry (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeInfo {
    #[serde(alias = "urlSegment")]
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub searches: Vec<SearchSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub url_segment: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

/// Expanded search detail — `GET /record-types/{rt}/searches/{s}?expanded=...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDetail {
    pub url_segment: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub param_names: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}

/// Payload for `POST /users/{u}/steps` (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStepRequest {
    pub search_name: String,
    pub search_config: SearchConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateStepResponse {
    pub id: i64,
}

/// Payload for `POST /users/{u}/strategies` (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStrategyRequest {
    pub name: String,
    pub is_public: bool,
    pub is_saved: bool,
    pub step_tree: StepTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Nested tree form threading real step ids through the compiled strategy
/// (§4.2 `stepTree`): `{stepId, primaryInput?, secondaryInput?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTree {
    pub step_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_input: Option<Box<StepTree>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_input: Option<Box<StepTree>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateStrategyResponse {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardReportResponse {
    pub meta: StandardReportMeta,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardReportMeta {
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatasetRequest {
    pub source_type: String,
    pub source_content: DatasetSourceContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSourceContent {
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateDatasetResponse {
    pub id: i64,
}

/// `GET .../users/current` — resolved once per session (§4.3).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
}

/// Opaque filter/report/analysis config bodies the adapter passes through
/// without interpreting.
pub type RawConfig = Value;
