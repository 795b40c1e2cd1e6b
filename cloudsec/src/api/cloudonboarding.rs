//! Cloud onboarding API: connected cloud accounts

use super::common::query_string;
use super::error::ApiError;
use crate::api::Client;
use serde::{Deserialize, Serialize};
use tfplug::Context;

const ACCOUNTS_PATH: &str = "/api/v1/cloudonboarding/accounts";

/// Agentless scanning settings of a cloud account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentlessScanning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval_hours: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_stopped_instances: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAccount {
    pub id: String,
    pub cloud_provider: String,
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub scan_mode: Option<String>,
    #[serde(default)]
    pub agentless_scanning: Option<AgentlessScanning>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCloudAccountRequest {
    pub cloud_provider: String,
    pub account_id: String,
    pub name: String,
    pub role_arn: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agentless_scanning: Option<AgentlessScanning>,
}

/// Partial update; unset fields are left untouched by the API
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCloudAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agentless_scanning: Option<AgentlessScanning>,
}

pub struct CloudOnboardingApi<'a> {
    client: &'a Client,
}

impl<'a> CloudOnboardingApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_account(
        &self,
        ctx: &Context,
        request: &CreateCloudAccountRequest,
    ) -> Result<CloudAccount, ApiError> {
        self.client.post(ctx, ACCOUNTS_PATH, request).await
    }

    pub async fn get_account(&self, ctx: &Context, id: &str) -> Result<CloudAccount, ApiError> {
        self.client.get(ctx, &account_path(id)).await
    }

    pub async fn update_account(
        &self,
        ctx: &Context,
        id: &str,
        request: &UpdateCloudAccountRequest,
    ) -> Result<CloudAccount, ApiError> {
        self.client.patch(ctx, &account_path(id), request).await
    }

    pub async fn delete_account(&self, ctx: &Context, id: &str) -> Result<(), ApiError> {
        self.client.delete(ctx, &account_path(id)).await
    }

    pub async fn list_accounts(
        &self,
        ctx: &Context,
        account_id: Option<&str>,
        cloud_provider: Option<&str>,
    ) -> Result<Vec<CloudAccount>, ApiError> {
        let path = format!(
            "{}{}",
            ACCOUNTS_PATH,
            query_string(&[("accountId", account_id), ("cloudProvider", cloud_provider)])
        );
        self.client.get(ctx, &path).await
    }
}

fn account_path(id: &str) -> String {
    format!("{}/{}", ACCOUNTS_PATH, urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn update_account_patches_only_set_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/v1/cloudonboarding/accounts/acc-1")
            .match_body(Matcher::Json(serde_json::json!({"name": "renamed"})))
            .with_body(
                r#"{"id":"acc-1","cloudProvider":"aws","accountId":"123456789012","name":"renamed","status":"connected"}"#,
            )
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let account = client
            .cloud_onboarding()
            .update_account(
                &Context::new(),
                "acc-1",
                &UpdateCloudAccountRequest {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(account.name, "renamed");
        assert!(account.regions.is_empty());
        assert_eq!(account.status.as_deref(), Some("connected"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_accounts_passes_lookup_keys() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex("^/api/v1/cloudonboarding/accounts".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("accountId".to_string(), "123456789012".to_string()),
                Matcher::UrlEncoded("cloudProvider".to_string(), "aws".to_string()),
            ]))
            .with_body("[]")
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let accounts = client
            .cloud_onboarding()
            .list_accounts(&Context::new(), Some("123456789012"), Some("aws"))
            .await
            .unwrap();

        assert!(accounts.is_empty());
        mock.assert_async().await;
    }
}
