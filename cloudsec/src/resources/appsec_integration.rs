//! Application security integration resource implementation
//!
//! Connects a source control organization. The API cannot modify an
//! integration, so every configurable attribute forces replacement.

use crate::api::appsec::{CreateIntegrationRequest, Integration};
use crate::crash;
use crate::provider_data::CloudSecProviderData;
use crate::resources::{api_diagnostic, not_configured, optional_string, optional_to_dynamic, required_string};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::StringOneOfValidator;
use tfplug::{AttributeBuilder, AttributeType, SchemaBuilder};

pub const TYPE_NAME: &str = "cloudsec_appsec_integration";

pub const INTEGRATION_TYPES: [&str; 4] = ["github", "gitlab", "bitbucket", "azure_devops"];

#[derive(Default)]
pub struct AppSecIntegrationResource {
    provider_data: Option<CloudSecProviderData>,
}

impl AppSecIntegrationResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn crash_dir(&self) -> Option<&std::path::Path> {
        self.provider_data.as_ref().and_then(|d| d.crash_dir())
    }

    async fn create_integration(
        &self,
        ctx: Context,
        request: CreateResourceRequest,
    ) -> CreateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics,
            };
        };

        let Some(body) = request_from_plan(&request.planned_state, &mut diagnostics) else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics,
            };
        };

        match provider_data
            .client
            .appsec()
            .create_integration(&ctx, &body)
            .await
        {
            Ok(integration) => {
                tracing::info!(id = %integration.id, kind = %integration.integration_type, "created appsec integration");
                CreateResourceResponse {
                    new_state: state_from_integration(&integration, &request.planned_state),
                    private: vec![],
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to create AppSec integration", &e));
                CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                }
            }
        }
    }

    async fn read_integration(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> ReadResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
                private: request.private,
                deferred: None,
            };
        };

        let id = match required_string(&request.current_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                };
            }
        };

        match provider_data.client.appsec().get_integration(&ctx, &id).await {
            Ok(integration) => ReadResourceResponse {
                new_state: Some(state_from_integration(&integration, &request.current_state)),
                diagnostics,
                private: request.private,
                deferred: None,
            },
            Err(e) if e.is_not_found() => ReadResourceResponse {
                new_state: None,
                diagnostics,
                private: request.private,
                deferred: None,
            },
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to read AppSec integration", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
        }
    }

    async fn delete_integration(
        &self,
        ctx: Context,
        request: DeleteResourceRequest,
    ) -> DeleteResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return DeleteResourceResponse { diagnostics };
        };

        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                diagnostics.push(diag);
                return DeleteResourceResponse { diagnostics };
            }
        };

        match provider_data.client.appsec().delete_integration(&ctx, &id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(api_diagnostic("Failed to delete AppSec integration", &e)),
        }

        DeleteResourceResponse { diagnostics }
    }
}

fn request_from_plan(
    plan: &DynamicValue,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<CreateIntegrationRequest> {
    let mut required = |name: &str| required_string(plan, name).map_err(|d| diagnostics.push(d)).ok();
    let name = required("name");
    let integration_type = required("integration_type");
    let organization = required("organization");
    let token = required("token");
    let base_url = optional_string(plan, "base_url", diagnostics);

    Some(CreateIntegrationRequest {
        name: name?,
        integration_type: integration_type?,
        organization: organization?,
        base_url,
        token: token?,
    })
}

/// State for `integration`; the token is write-only and kept from `prior`
fn state_from_integration(integration: &Integration, prior: &DynamicValue) -> DynamicValue {
    let token = prior
        .get(&AttributePath::new("token"))
        .unwrap_or(Dynamic::Null);

    DynamicValue::new(Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::from(integration.id.as_str())),
        ("name".to_string(), Dynamic::from(integration.name.as_str())),
        (
            "integration_type".to_string(),
            Dynamic::from(integration.integration_type.as_str()),
        ),
        (
            "organization".to_string(),
            Dynamic::from(integration.organization.as_str()),
        ),
        (
            "base_url".to_string(),
            optional_to_dynamic(integration.base_url.as_deref().filter(|u| !u.is_empty())),
        ),
        ("token".to_string(), token),
        ("status".to_string(), optional_to_dynamic(integration.status.as_deref())),
    ])))
}

#[async_trait]
impl Resource for AppSecIntegrationResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: TYPE_NAME.to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Connects a source control organization for application security scanning")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Integration identifier")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Display name")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("integration_type", AttributeType::String)
                    .description("Source control system: github, gitlab, bitbucket or azure_devops")
                    .required()
                    .validator(StringOneOfValidator::new(INTEGRATION_TYPES))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("organization", AttributeType::String)
                    .description("Organization, group or workspace to scan")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("base_url", AttributeType::String)
                    .description("Base URL of a self-hosted instance")
                    .optional()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("token", AttributeType::String)
                    .description("Access token used by the integration")
                    .required()
                    .sensitive()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .description("Connection status reported by CloudSec")
                    .computed()
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let planned_state = request.planned_state.clone();
        crash::guard(
            "cloudsec_appsec_integration create",
            self.crash_dir(),
            self.create_integration(ctx, request),
        )
        .await
        .unwrap_or_else(|diag| CreateResourceResponse {
            new_state: planned_state,
            private: vec![],
            diagnostics: vec![diag],
        })
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let current_state = request.current_state.clone();
        crash::guard(
            "cloudsec_appsec_integration read",
            self.crash_dir(),
            self.read_integration(ctx, request),
        )
        .await
        .unwrap_or_else(|diag| ReadResourceResponse {
            new_state: Some(current_state),
            diagnostics: vec![diag],
            private: vec![],
            deferred: None,
        })
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.prior_state,
            private: vec![],
            diagnostics: vec![Diagnostic::error(
                "Update not supported",
                "AppSec integrations cannot be modified; change a configurable attribute to replace the integration",
            )],
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        crash::guard(
            "cloudsec_appsec_integration delete",
            self.crash_dir(),
            self.delete_integration(ctx, request),
        )
        .await
        .unwrap_or_else(|diag| DeleteResourceResponse {
            diagnostics: vec![diag],
        })
    }
}

#[async_trait]
impl ResourceWithConfigure for AppSecIntegrationResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];
        self.provider_data =
            CloudSecProviderData::from_configure(request.provider_data, &mut diagnostics);
        ConfigureResourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Client, ClientConfig};
    use mockito::{Matcher, Server};
    use tfplug::resource::ImportResourceStateRequest;

    fn planned_integration() -> DynamicValue {
        DynamicValue::new(Dynamic::Map(
            [
                ("id", Dynamic::Unknown),
                ("name", Dynamic::from("acme-github")),
                ("integration_type", Dynamic::from("github")),
                ("organization", Dynamic::from("acme")),
                ("base_url", Dynamic::Null),
                ("token", Dynamic::from("ghp_secret")),
                ("status", Dynamic::Unknown),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        ))
    }

    #[tokio::test]
    async fn token_is_sensitive_and_forces_replacement() {
        let schema = AppSecIntegrationResource::new()
            .schema(Context::new(), ResourceSchemaRequest)
            .await
            .schema;

        let token = schema.attribute("token").unwrap();
        assert!(token.sensitive);
        assert_eq!(token.plan_modifiers.len(), 1);
    }

    #[tokio::test]
    async fn create_keeps_token_from_plan() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/appsec/integrations")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "integrationType": "github",
                "token": "ghp_secret",
            })))
            .with_status(201)
            .with_body(
                r#"{"id":"int-1","name":"acme-github","integrationType":"github","organization":"acme","status":"connected"}"#,
            )
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url(), "key")).unwrap();
        let resource = AppSecIntegrationResource {
            provider_data: Some(CloudSecProviderData::new(client, None)),
        };
        let planned_state = planned_integration();
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    planned_state: planned_state.clone(),
                    config: planned_state,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("token")).unwrap(),
            "ghp_secret"
        );
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("status")).unwrap(),
            "connected"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_and_import_are_declined() {
        let resource = AppSecIntegrationResource::new();

        let update = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    prior_state: planned_integration(),
                    planned_state: planned_integration(),
                    config: planned_integration(),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;
        assert!(update.diagnostics[0].is_error());
        assert_eq!(update.new_state, planned_integration());

        let import = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: TYPE_NAME.to_string(),
                    id: "int-1".to_string(),
                    client_capabilities: Default::default(),
                },
            )
            .await;
        assert!(import.imported_resources.is_empty());
        assert!(import.diagnostics[0].is_error());
    }
}
