//! Terraform provider for the CloudSec platform

pub mod api;
pub mod config;
pub mod crash;
pub mod data_sources;
pub mod filter;
pub mod logging;
pub mod planmodifiers;
pub mod provider_data;
pub mod resources;

pub use provider_data::CloudSecProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory, ValidateProviderConfigRequest,
    ValidateProviderConfigResponse,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{Diagnostic, ServerCapabilities};
use tfplug::validator::{NumberRangeValidator, StringOneOfValidator};

pub const PROVIDER_TYPE_NAME: &str = "cloudsec";

#[derive(Default)]
pub struct CloudSecProvider;

impl CloudSecProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for CloudSecProvider {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_NAME
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: PROVIDER_TYPE_NAME.to_string(),
            server_capabilities: ServerCapabilities {
                plan_destroy: false,
                get_provider_schema_optional: true,
                move_resource_state: false,
            },
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages CloudSec asset groups, cloud accounts, runtime policies and source control integrations")
            .attribute(
                AttributeBuilder::new(config::CONFIG_FILE, AttributeType::String)
                    .description("Path to a JSON file holding provider settings")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::API_URL, AttributeType::String)
                    .description("Base URL of the CloudSec API. Can also be set with CLOUDSEC_API_URL")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::API_KEY, AttributeType::String)
                    .description("API key. Can also be set with CLOUDSEC_API_KEY")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::API_KEY_ID, AttributeType::String)
                    .description("API key ID, required for api-key authentication")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::API_KEY_TYPE, AttributeType::String)
                    .description("Authentication scheme: api-key (default) or bearer")
                    .optional()
                    .validator(StringOneOfValidator::new(config::API_KEY_TYPES))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::SDK_LOG_LEVEL, AttributeType::String)
                    .description("Log level of the API client")
                    .optional()
                    .validator(StringOneOfValidator::new(config::SDK_LOG_LEVELS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::SKIP_SSL_VERIFY, AttributeType::Bool)
                    .description("Skip TLS certificate verification. Defaults to false")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::REQUEST_TIMEOUT, AttributeType::Number)
                    .description("Request timeout in seconds. Defaults to 60")
                    .optional()
                    .validator(NumberRangeValidator {
                        min: Some(1.0),
                        max: None,
                    })
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::REQUEST_RETRY_INTERVAL, AttributeType::Number)
                    .description("Initial delay between retries in seconds. Defaults to 5")
                    .optional()
                    .validator(NumberRangeValidator {
                        min: Some(0.0),
                        max: None,
                    })
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(config::CRASH_STACK_DIR, AttributeType::String)
                    .description("Directory for crash reports written when the provider panics")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let mut diagnostics = vec![];

        let Some(config) = config::resolve(&request.config, &mut diagnostics) else {
            return ConfigureProviderResponse {
                diagnostics,
                provider_data: None,
            };
        };

        if let Some(level) = &config.sdk_log_level {
            if let Err(e) = logging::set_sdk_log_level(level) {
                diagnostics.push(Diagnostic::warning(
                    "Failed to apply sdk_log_level",
                    format!("Keeping the current log level: {}", e),
                ));
            }
        }

        let client = match api::Client::new(config.client_config()) {
            Ok(client) => client,
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create API client",
                    e.to_string(),
                ));
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
        };

        tracing::info!(
            api_url = %config.api_url,
            terraform_version = %request.terraform_version,
            "configured cloudsec provider"
        );

        let provider_data = CloudSecProviderData::new(client, config.crash_stack_dir);

        ConfigureProviderResponse {
            diagnostics,
            provider_data: Some(Arc::new(provider_data) as Arc<dyn std::any::Any + Send + Sync>),
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        let mut diagnostics = vec![];
        config::ProviderSettings::from_block(&request.config, &mut diagnostics);
        ValidateProviderConfigResponse { diagnostics }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();

        factories.insert(
            resources::asset_group::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(resources::AssetGroupResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            resources::aws_account::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(resources::AwsAccountResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            resources::cwp_policy::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(resources::CwpPolicyResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            resources::appsec_integration::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(resources::AppSecIntegrationResource::new())
                    as Box<dyn ResourceWithConfigure>
            }),
        );

        factories
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut factories: HashMap<String, DataSourceFactory> = HashMap::new();

        factories.insert(
            data_sources::asset_group::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(data_sources::AssetGroupDataSource::new())
                    as Box<dyn DataSourceWithConfigure>
            }),
        );
        factories.insert(
            data_sources::cloud_account::TYPE_NAME.to_string(),
            Box::new(|| {
                Box::new(data_sources::CloudAccountDataSource::new())
                    as Box<dyn DataSourceWithConfigure>
            }),
        );

        factories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tfplug::types::{ClientCapabilities, Dynamic, DynamicValue};
    use tfplug::AttributePath;

    fn block(values: Vec<(&str, Dynamic)>) -> DynamicValue {
        let mut config = DynamicValue::object();
        for (name, value) in values {
            config.set_value(&AttributePath::new(name), value).unwrap();
        }
        config
    }

    fn clear_env() {
        for (_, names) in config::ENV_VARS {
            for name in names {
                std::env::remove_var(name);
            }
        }
    }

    async fn configure(provider: &mut CloudSecProvider, config: DynamicValue) -> ConfigureProviderResponse {
        provider
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.9.0".to_string(),
                    config,
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await
    }

    #[test]
    fn registers_resources_and_data_sources() {
        let provider = CloudSecProvider::new();

        let mut resources: Vec<String> = provider.resources().into_keys().collect();
        resources.sort();
        assert_eq!(
            resources,
            vec![
                "cloudsec_appsec_integration",
                "cloudsec_asset_group",
                "cloudsec_aws_account",
                "cloudsec_cwp_policy",
            ]
        );

        let mut data_sources: Vec<String> = provider.data_sources().into_keys().collect();
        data_sources.sort();
        assert_eq!(data_sources, vec!["cloudsec_asset_group", "cloudsec_cloud_account"]);

        for (name, factory) in provider.resources() {
            assert_eq!(factory().type_name(), name);
        }
    }

    #[tokio::test]
    async fn api_key_is_sensitive() {
        let provider = CloudSecProvider::new();
        let schema = provider
            .schema(Context::new(), ProviderSchemaRequest)
            .await
            .schema;

        assert!(schema.attribute(config::API_KEY).unwrap().sensitive);
        assert!(schema.block.attributes.iter().all(|a| a.optional));
    }

    #[tokio::test]
    #[serial]
    async fn configure_creates_provider_data() {
        clear_env();
        let mut provider = CloudSecProvider::new();

        let response = configure(
            &mut provider,
            block(vec![
                (config::API_URL, Dynamic::from("https://cloudsec.example.com")),
                (config::API_KEY, Dynamic::from("secret")),
                (config::API_KEY_ID, Dynamic::from("key-1")),
            ]),
        )
        .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<CloudSecProviderData>().unwrap();
        assert_eq!(data.client.base_url(), "https://cloudsec.example.com");
    }

    #[tokio::test]
    #[serial]
    async fn configure_reports_missing_settings() {
        clear_env();
        let mut provider = CloudSecProvider::new();

        let response = configure(&mut provider, DynamicValue::object()).await;

        assert!(response.provider_data.is_none());
        assert!(tfplug::types::has_errors(&response.diagnostics));
        assert!(response
            .diagnostics
            .iter()
            .any(|d| d.attribute == Some(AttributePath::new(config::API_URL))));
    }

    #[tokio::test]
    #[serial]
    async fn environment_settings_override_block() {
        clear_env();
        std::env::set_var("CLOUDSEC_API_URL", "https://env.example.com");
        let mut provider = CloudSecProvider::new();

        let response = configure(
            &mut provider,
            block(vec![
                (config::API_URL, Dynamic::from("https://block.example.com")),
                (config::API_KEY, Dynamic::from("secret")),
                (config::API_KEY_TYPE, Dynamic::from("bearer")),
            ]),
        )
        .await;
        clear_env();

        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<CloudSecProviderData>().unwrap();
        assert_eq!(data.client.base_url(), "https://env.example.com");
    }
}
