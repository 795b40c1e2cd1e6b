//! Platform API: asset groups

use super::common::{query_string, Filter};
use super::error::ApiError;
use crate::api::Client;
use serde::{Deserialize, Serialize};
use tfplug::Context;

const ASSET_GROUPS_PATH: &str = "/api/v1/platform/asset-groups";

/// Asset group as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub asset_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Request body for creating and replacing asset groups
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetGroupRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

pub struct PlatformApi<'a> {
    client: &'a Client,
}

impl<'a> PlatformApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_asset_group(
        &self,
        ctx: &Context,
        request: &AssetGroupRequest,
    ) -> Result<AssetGroup, ApiError> {
        self.client.post(ctx, ASSET_GROUPS_PATH, request).await
    }

    pub async fn get_asset_group(&self, ctx: &Context, id: &str) -> Result<AssetGroup, ApiError> {
        self.client.get(ctx, &asset_group_path(id)).await
    }

    pub async fn update_asset_group(
        &self,
        ctx: &Context,
        id: &str,
        request: &AssetGroupRequest,
    ) -> Result<AssetGroup, ApiError> {
        self.client.put(ctx, &asset_group_path(id), request).await
    }

    pub async fn delete_asset_group(&self, ctx: &Context, id: &str) -> Result<(), ApiError> {
        self.client.delete(ctx, &asset_group_path(id)).await
    }

    /// List asset groups, optionally narrowed to an exact name
    pub async fn list_asset_groups(
        &self,
        ctx: &Context,
        name: Option<&str>,
    ) -> Result<Vec<AssetGroup>, ApiError> {
        let path = format!("{}{}", ASSET_GROUPS_PATH, query_string(&[("name", name)]));
        self.client.get(ctx, &path).await
    }
}

fn asset_group_path(id: &str) -> String {
    format!("{}/{}", ASSET_GROUPS_PATH, urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use mockito::Server;

    #[tokio::test]
    async fn create_asset_group_posts_filter() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/platform/asset-groups")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "name": "prod",
                "filter": {"and": [{"searchField": "env", "searchType": "EQ", "searchValue": "prod"}]}
            })))
            .with_status(201)
            .with_body(r#"{"id":"ag-1","name":"prod","assetCount":4}"#)
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let group = client
            .platform()
            .create_asset_group(
                &Context::new(),
                &AssetGroupRequest {
                    name: "prod".to_string(),
                    description: None,
                    filter: Some(Filter {
                        and: Some(vec![Filter {
                            search_field: Some("env".to_string()),
                            search_type: Some("EQ".to_string()),
                            search_value: Some("prod".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
            )
            .await
            .unwrap();

        assert_eq!(group.id, "ag-1");
        assert_eq!(group.asset_count, Some(4));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_asset_groups_filters_by_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex("^/api/v1/platform/asset-groups".to_string()),
            )
            .match_query(mockito::Matcher::UrlEncoded(
                "name".to_string(),
                "prod eu".to_string(),
            ))
            .with_body(r#"{"data":[{"id":"ag-1","name":"prod eu"}]}"#)
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let groups = client
            .platform()
            .list_asset_groups(&Context::new(), Some("prod eu"))
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "prod eu");
        mock.assert_async().await;
    }
}
