//! Application security API: source control integrations

use super::error::ApiError;
use crate::api::Client;
use serde::{Deserialize, Serialize};
use tfplug::Context;

const INTEGRATIONS_PATH: &str = "/api/v1/appsec/integrations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub integration_type: String,
    pub organization: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegrationRequest {
    pub name: String,
    pub integration_type: String,
    pub organization: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub token: String,
}

pub struct AppSecApi<'a> {
    client: &'a Client,
}

impl<'a> AppSecApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_integration(
        &self,
        ctx: &Context,
        request: &CreateIntegrationRequest,
    ) -> Result<Integration, ApiError> {
        self.client.post(ctx, INTEGRATIONS_PATH, request).await
    }

    pub async fn get_integration(&self, ctx: &Context, id: &str) -> Result<Integration, ApiError> {
        self.client.get(ctx, &integration_path(id)).await
    }

    pub async fn delete_integration(&self, ctx: &Context, id: &str) -> Result<(), ApiError> {
        self.client.delete(ctx, &integration_path(id)).await
    }
}

fn integration_path(id: &str) -> String {
    format!("{}/{}", INTEGRATIONS_PATH, urlencoding::encode(id))
}
