//! Cloud account data source implementation

use crate::api::cloudonboarding::CloudAccount;
use crate::crash;
use crate::data_sources::select_single;
use crate::provider_data::CloudSecProviderData;
use crate::resources::{api_diagnostic, not_configured, optional_to_dynamic, required_string, strings_to_dynamic};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, NestedType, ObjectNestingMode, SchemaBuilder};
use tfplug::types::{Dynamic, DynamicValue};
use tfplug::validator::StringOneOfValidator;

pub const TYPE_NAME: &str = "cloudsec_cloud_account";

pub const CLOUD_PROVIDERS: [&str; 3] = ["aws", "azure", "gcp"];

#[derive(Default)]
pub struct CloudAccountDataSource {
    provider_data: Option<CloudSecProviderData>,
}

impl CloudAccountDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read_account(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> ReadDataSourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics,
                deferred: None,
            };
        };

        let lookup = required_string(&request.config, "account_id").and_then(|account_id| {
            required_string(&request.config, "cloud_provider").map(|provider| (account_id, provider))
        });
        let (account_id, cloud_provider) = match lookup {
            Ok(lookup) => lookup,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                    deferred: None,
                };
            }
        };

        let accounts = match provider_data
            .client
            .cloud_onboarding()
            .list_accounts(&ctx, Some(&account_id), Some(&cloud_provider))
            .await
        {
            Ok(accounts) => accounts,
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to list cloud accounts", &e));
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                    deferred: None,
                };
            }
        };

        let matches: Vec<CloudAccount> = accounts
            .into_iter()
            .filter(|a| a.account_id == account_id && a.cloud_provider == cloud_provider)
            .collect();

        let state = select_single(
            matches,
            "cloud account",
            &format!("{} account {:?}", cloud_provider, account_id),
            &mut diagnostics,
        )
        .map(|account| state_from_account(&account))
        .unwrap_or_else(DynamicValue::null);

        ReadDataSourceResponse {
            state,
            diagnostics,
            deferred: None,
        }
    }
}

fn state_from_account(account: &CloudAccount) -> DynamicValue {
    let agentless = account
        .agentless_scanning
        .as_ref()
        .map_or(Dynamic::Null, |settings| {
            Dynamic::Map(HashMap::from([
                (
                    "scan_interval_hours".to_string(),
                    settings
                        .scan_interval_hours
                        .map_or(Dynamic::Null, |n| Dynamic::Number(n as f64)),
                ),
                (
                    "include_stopped_instances".to_string(),
                    settings
                        .include_stopped_instances
                        .map_or(Dynamic::Null, Dynamic::Bool),
                ),
            ]))
        });

    DynamicValue::new(Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::from(account.id.as_str())),
        ("account_id".to_string(), Dynamic::from(account.account_id.as_str())),
        (
            "cloud_provider".to_string(),
            Dynamic::from(account.cloud_provider.as_str()),
        ),
        ("name".to_string(), Dynamic::from(account.name.as_str())),
        ("role_arn".to_string(), optional_to_dynamic(account.role_arn.as_deref())),
        ("regions".to_string(), strings_to_dynamic(&account.regions)),
        ("scan_mode".to_string(), optional_to_dynamic(account.scan_mode.as_deref())),
        ("agentless_scanning".to_string(), agentless),
        ("status".to_string(), optional_to_dynamic(account.status.as_deref())),
    ])))
}

#[async_trait]
impl DataSource for CloudAccountDataSource {
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
        let computed_string = |name: &str| {
            AttributeBuilder::new(name, AttributeType::String)
                .computed()
                .build()
        };

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Looks up a connected cloud account by its provider-side account ID")
            .attribute(
                AttributeBuilder::new("account_id", AttributeType::String)
                    .description("Account, subscription or project ID in the cloud provider")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("cloud_provider", AttributeType::String)
                    .description("One of aws, azure or gcp")
                    .required()
                    .validator(StringOneOfValidator::new(CLOUD_PROVIDERS))
                    .build(),
            )
            .attribute(computed_string("id"))
            .attribute(computed_string("name"))
            .attribute(computed_string("role_arn"))
            .attribute(
                AttributeBuilder::new("regions", AttributeType::List(Box::new(AttributeType::String)))
                    .computed()
                    .build(),
            )
            .attribute(computed_string("scan_mode"))
            .attribute(
                AttributeBuilder::nested(
                    "agentless_scanning",
                    NestedType::new(
                        ObjectNestingMode::Single,
                        vec![
                            AttributeBuilder::new("scan_interval_hours", AttributeType::Number)
                                .computed()
                                .build(),
                            AttributeBuilder::new("include_stopped_instances", AttributeType::Bool)
                                .computed()
                                .build(),
                        ],
                    ),
                )
                .computed()
                .build(),
            )
            .attribute(computed_string("status"))
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let crash_dir = self.provider_data.as_ref().and_then(|d| d.crash_dir());
        crash::guard("data.cloudsec_cloud_account read", crash_dir, self.read_account(ctx, request))
            .await
            .unwrap_or_else(|diag| ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![diag],
                deferred: None,
            })
    }
}

#[async_trait]
impl DataSourceWithConfigure for CloudAccountDataSource {
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
    use tfplug::AttributePath;

    #[tokio::test]
    async fn read_filters_by_account_and_provider() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex("^/api/v1/cloudonboarding/accounts".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("accountId".to_string(), "123456789012".to_string()),
                Matcher::UrlEncoded("cloudProvider".to_string(), "aws".to_string()),
            ]))
            .with_body(
                r#"[{"id":"acc-1","cloudProvider":"aws","accountId":"123456789012","name":"prod",
                     "regions":["eu-west-1"],"scanMode":"agent","status":"connected"}]"#,
            )
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let data_source = CloudAccountDataSource {
            provider_data: Some(CloudSecProviderData::new(client, None)),
        };

        let mut config = DynamicValue::object();
        config
            .set_string(&AttributePath::new("account_id"), "123456789012".to_string())
            .unwrap();
        config
            .set_string(&AttributePath::new("cloud_provider"), "aws".to_string())
            .unwrap();

        let response = data_source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    config,
                    provider_meta: None,
                    client_capabilities: Default::default(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "acc-1");
        assert_eq!(
            state.get_list(&AttributePath::new("regions")).unwrap(),
            vec![Dynamic::from("eu-west-1")]
        );
        assert_eq!(
            state.get(&AttributePath::new("agentless_scanning")).unwrap(),
            Dynamic::Null
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_read_reports_error() {
        let response = CloudAccountDataSource::new()
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    config: DynamicValue::object(),
                    provider_meta: None,
                    client_capabilities: Default::default(),
                },
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
    }
}
