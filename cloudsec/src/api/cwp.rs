//! Cloud workload protection API: runtime policies
//!
//! Policies cannot be modified once created; changes are made by replacing them.

use super::common::Filter;
use super::error::ApiError;
use crate::api::Client;
use serde::{Deserialize, Serialize};
use tfplug::Context;

const POLICIES_PATH: &str = "/api/v1/cwp/policies";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub action: String,
    #[serde(default)]
    pub block_message: Option<String>,
    #[serde(default)]
    pub scope: Option<Filter>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_triggered_at: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePolicyRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Filter>,
    pub enabled: bool,
}

pub struct CwpApi<'a> {
    client: &'a Client,
}

impl<'a> CwpApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_policy(
        &self,
        ctx: &Context,
        request: &CreatePolicyRequest,
    ) -> Result<Policy, ApiError> {
        self.client.post(ctx, POLICIES_PATH, request).await
    }

    pub async fn get_policy(&self, ctx: &Context, id: &str) -> Result<Policy, ApiError> {
        self.client.get(ctx, &policy_path(id)).await
    }

    pub async fn delete_policy(&self, ctx: &Context, id: &str) -> Result<(), ApiError> {
        self.client.delete(ctx, &policy_path(id)).await
    }
}

fn policy_path(id: &str) -> String {
    format!("{}/{}", POLICIES_PATH, urlencoding::encode(id))
}
