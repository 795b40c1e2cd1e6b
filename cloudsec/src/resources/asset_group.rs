//! Asset group resource implementation
//!
//! Asset groups collect cloud assets matching a filter expression and are
//! updated in place.

use crate::api::platform::{AssetGroup, AssetGroupRequest};
use crate::crash;
use crate::filter::{self, MAX_FILTER_DEPTH};
use crate::provider_data::CloudSecProviderData;
use crate::resources::{api_diagnostic, not_configured, optional_string, optional_to_dynamic, required_string};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    UpdateResourceRequest, UpdateResourceResponse, ValidateResourceConfigRequest,
    ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::StringLengthValidator;

pub const TYPE_NAME: &str = "cloudsec_asset_group";

#[derive(Default)]
pub struct AssetGroupResource {
    provider_data: Option<CloudSecProviderData>,
}

impl AssetGroupResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn crash_dir(&self) -> Option<&std::path::Path> {
        self.provider_data.as_ref().and_then(|d| d.crash_dir())
    }

    fn request_from_plan(
        &self,
        plan: &DynamicValue,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<AssetGroupRequest> {
        let name = match required_string(plan, "name") {
            Ok(name) => name,
            Err(diag) => {
                diagnostics.push(diag);
                return None;
            }
        };
        let description = optional_string(plan, "description", diagnostics);

        let filter_path = AttributePath::new("filter");
        let filter_value = plan.get(&filter_path).unwrap_or(Dynamic::Null);
        let start = diagnostics.len();
        let root = filter::root_from_config(&filter_value, &filter_path, diagnostics);
        if diagnostics.len() > start {
            return None;
        }

        Some(AssetGroupRequest {
            name,
            description,
            filter: filter::to_remote(root.as_ref()),
        })
    }

    async fn create_group(
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

        let Some(body) = self.request_from_plan(&request.planned_state, &mut diagnostics) else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics,
            };
        };

        match provider_data
            .client
            .platform()
            .create_asset_group(&ctx, &body)
            .await
        {
            Ok(group) => {
                tracing::info!(id = %group.id, "created asset group");
                let new_state = state_from_group(&group, &request.planned_state, &mut diagnostics)
                    .unwrap_or(request.planned_state);
                CreateResourceResponse {
                    new_state,
                    private: vec![],
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to create asset group", &e));
                CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                }
            }
        }
    }

    async fn read_group(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
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

        match provider_data.client.platform().get_asset_group(&ctx, &id).await {
            Ok(group) => {
                let new_state = state_from_group(&group, &request.current_state, &mut diagnostics)
                    .unwrap_or(request.current_state);
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
            Err(e) if e.is_not_found() => ReadResourceResponse {
                new_state: None,
                diagnostics,
                private: request.private,
                deferred: None,
            },
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to read asset group", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
        }
    }

    async fn update_group(
        &self,
        ctx: Context,
        request: UpdateResourceRequest,
    ) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        };

        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };

        let Some(body) = self.request_from_plan(&request.planned_state, &mut diagnostics) else {
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        };

        match provider_data
            .client
            .platform()
            .update_asset_group(&ctx, &id, &body)
            .await
        {
            Ok(group) => {
                let new_state = state_from_group(&group, &request.planned_state, &mut diagnostics)
                    .unwrap_or(request.prior_state);
                UpdateResourceResponse {
                    new_state,
                    private: vec![],
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to update asset group", &e));
                UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                }
            }
        }
    }

    async fn delete_group(
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

        match provider_data.client.platform().delete_asset_group(&ctx, &id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(%id, "asset group already deleted");
            }
            Err(e) => diagnostics.push(api_diagnostic("Failed to delete asset group", &e)),
        }

        DeleteResourceResponse { diagnostics }
    }
}

/// Full resource state from an API object; `prior` guides empty filter lists
fn state_from_group(
    group: &AssetGroup,
    prior: &DynamicValue,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<DynamicValue> {
    let prior_filter = prior.get(&AttributePath::new("filter")).unwrap_or(Dynamic::Null);
    let filter = filter::from_remote(group.filter.as_ref())
        .and_then(|root| filter::root_to_state(root.as_ref(), &prior_filter, MAX_FILTER_DEPTH));
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

    let fields = HashMap::from([
        ("id".to_string(), Dynamic::from(group.id.as_str())),
        ("name".to_string(), Dynamic::from(group.name.as_str())),
        // Unset descriptions come back as ""; config cannot hold "" itself
        (
            "description".to_string(),
            optional_to_dynamic(group.description.as_deref().filter(|d| !d.is_empty())),
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
    ]);

    Some(DynamicValue::new(Dynamic::Map(fields)))
}

#[async_trait]
impl Resource for AssetGroupResource {
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
            .description("Manages an asset group, a named set of cloud assets selected by a filter")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Asset group identifier")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Display name, unique within the tenant")
                    .required()
                    .validator(StringLengthValidator {
                        min: Some(1),
                        max: Some(128),
                    })
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .description("Free-form description")
                    .optional()
                    .validator(StringLengthValidator {
                        min: Some(1),
                        max: None,
                    })
                    .build(),
            )
            .attribute(
                filter::filter_root_attribute("filter", MAX_FILTER_DEPTH)
                    .description("Conditions selecting the assets that belong to the group")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("asset_count", AttributeType::Number)
                    .description("Number of assets currently matching the filter")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("created_at", AttributeType::String)
                    .description("Creation timestamp (RFC 3339)")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];
        let path = AttributePath::new("filter");
        let value = request.config.get(&path).unwrap_or(Dynamic::Null);
        filter::root_from_config(&value, &path, &mut diagnostics);

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let planned_state = request.planned_state.clone();
        crash::guard("cloudsec_asset_group create", self.crash_dir(), self.create_group(ctx, request))
            .await
            .unwrap_or_else(|diag| CreateResourceResponse {
                new_state: planned_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let current_state = request.current_state.clone();
        crash::guard("cloudsec_asset_group read", self.crash_dir(), self.read_group(ctx, request))
            .await
            .unwrap_or_else(|diag| ReadResourceResponse {
                new_state: Some(current_state),
                diagnostics: vec![diag],
                private: vec![],
                deferred: None,
            })
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let prior_state = request.prior_state.clone();
        crash::guard("cloudsec_asset_group update", self.crash_dir(), self.update_group(ctx, request))
            .await
            .unwrap_or_else(|diag| UpdateResourceResponse {
                new_state: prior_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        crash::guard("cloudsec_asset_group delete", self.crash_dir(), self.delete_group(ctx, request))
            .await
            .unwrap_or_else(|diag| DeleteResourceResponse {
                diagnostics: vec![diag],
            })
    }

    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };
        tfplug::import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}

#[async_trait]
impl ResourceWithConfigure for AssetGroupResource {
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
