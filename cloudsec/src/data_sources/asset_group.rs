//! Asset group data source implementation

use crate::api::platform::AssetGroup;
use crate::crash;
use crate::data_sources::select_single;
use crate::filter::{self, MAX_FILTER_DEPTH};
use crate::provider_data::CloudSecProviderData;
use crate::resources::{api_diagnostic, not_configured, optional_to_dynamic, required_string};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "cloudsec_asset_group";

#[derive(Default)]
pub struct AssetGroupDataSource {
    provider_data: Option<CloudSecProviderData>,
}

impl AssetGroupDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read_group(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics,
                deferred: None,
            };
        };

        let name = match required_string(&request.config, "name") {
            Ok(name) => name,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                    deferred: None,
                };
            }
        };

        let groups = match provider_data
            .client
            .platform()
            .list_asset_groups(&ctx, Some(&name))
            .await
        {
            Ok(groups) => groups,
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to list asset groups", &e));
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                    deferred: None,
                };
            }
        };

        let matches: Vec<AssetGroup> = groups.into_iter().filter(|g| g.name == name).collect();
        tracing::debug!(%name, matches = matches.len(), "looked up asset group");

        let state = select_single(
            matches,
            "asset group",
            &format!("name {:?}", name),
            &mut diagnostics,
        )
        .and_then(|group| state_from_group(&group, &mut diagnostics))
        .unwrap_or_else(DynamicValue::null);

        ReadDataSourceResponse {
            state,
            diagnostics,
            deferred: None,
        }
    }
}

fn state_from_group(group: &AssetGroup, diagnostics: &mut Vec<Diagnostic>) -> Option<DynamicValue> {
    let filter = filter::from_remote(group.filter.as_ref())
        .and_then(|root| filter::root_to_state(root.as_ref(), &Dynamic::Null, MAX_FILTER_DEPTH));
    let filter = match filter {
        Ok(filter) => filter,
        Err(e) => {
            diagnostics.push(
                Diagnostic::error("Unsupported asset group filter", e.to_string())
                    .with_attribute(AttributePath::new("filter")),
            );
            return None;
        }
    };

    Some(DynamicValue::new(Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::from(group.id.as_str())),
        ("name".to_string(), Dynamic::from(group.name.as_str())),
        (
            "description".to_string(),
            optional_to_dynamic(group.description.as_deref()),
        ),
        ("filter".to_string(), filter),
        (
            "asset_count".to_string(),
            group
                .asset_count
                .map_or(Dynamic::Null, |n| Dynamic::Number(n as f64)),
        ),
        (
            "created_at".to_string(),
            optional_to_dynamic(group.created_at.as_deref()),
        ),
    ]))))
}

#[async_trait]
impl DataSource for AssetGroupDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: TYPE_NAME.to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Looks up an asset group by name")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the asset group")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                filter::filter_root_attribute("filter", MAX_FILTER_DEPTH)
                    .description("Conditions selecting the group's assets")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("asset_count", AttributeType::Number)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("created_at", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let crash_dir = self.provider_data.as_ref().and_then(|d| d.crash_dir());
        crash::guard("data.cloudsec_asset_group read", crash_dir, self.read_group(ctx, request))
            .await
            .unwrap_or_else(|diag| ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![diag],
                deferred: None,
            })
    }
}

#[async_trait]
impl DataSourceWithConfigure for AssetGroupDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];
        self.provider_data =
            CloudSecProviderData::from_configure(request.provider_data, &mut diagnostics);
        ConfigureDataSourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Client, ClientConfig};
    use mockito::{Matcher, Server};

    fn request(name: &str) -> ReadDataSourceRequest {
        let mut config = DynamicValue::object();
        config
            .set_string(&AttributePath::new("name"), name.to_string())
            .unwrap();
        ReadDataSourceRequest {
            type_name: TYPE_NAME.to_string(),
            config,
            provider_meta: None,
            client_capabilities: Default::default(),
        }
    }

    fn configured(server: &Server) -> AssetGroupDataSource {
        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        AssetGroupDataSource {
            provider_data: Some(CloudSecProviderData::new(client, None)),
        }
    }

    #[tokio::test]
    async fn read_picks_exact_name_match() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/api/v1/platform/asset-groups".to_string()))
            .match_query(Matcher::UrlEncoded("name".to_string(), "prod".to_string()))
            .with_body(
                r#"[{"id":"ag-2","name":"prod-eu"},
                    {"id":"ag-1","name":"prod","assetCount":4,
                     "filter":{"or":[{"searchField":"env","searchType":"EQ","searchValue":"prod"}]}}]"#,
            )
            .create_async()
            .await;

        let response = configured(&server).read(Context::new(), request("prod")).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "ag-1");
        assert_eq!(state.get_number(&AttributePath::new("asset_count")).unwrap(), 4.0);
        assert_eq!(
            state
                .get_string(&AttributePath::new("filter").attribute("or").index(0).attribute("search_value"))
                .unwrap(),
            "prod"
        );
        assert_eq!(
            state.get(&AttributePath::new("filter").attribute("and")).unwrap(),
            Dynamic::Null
        );
    }

    #[tokio::test]
    async fn read_warns_on_duplicate_names() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/api/v1/platform/asset-groups".to_string()))
            .with_body(r#"[{"id":"ag-1","name":"prod"},{"id":"ag-9","name":"prod"}]"#)
            .create_async()
            .await;

        let response = configured(&server).read(Context::new(), request("prod")).await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(!response.diagnostics[0].is_error());
        assert_eq!(response.state.get_string(&AttributePath::new("id")).unwrap(), "ag-1");
    }

    #[tokio::test]
    async fn read_errors_when_nothing_matches() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/api/v1/platform/asset-groups".to_string()))
            .with_body("[]")
            .create_async()
            .await;

        let response = configured(&server).read(Context::new(), request("prod")).await;

        assert!(response.diagnostics[0].is_error());
        assert!(response.state.is_null());
    }
}
