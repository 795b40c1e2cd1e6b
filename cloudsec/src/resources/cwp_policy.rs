//! Cloud workload protection policy resource implementation
//!
//! The policy API has no update endpoint. Terraform plans changes as in-place
//! updates and the provider carries them out as delete followed by create,
//! which yields a new `id`.

use crate::api::cwp::{CreatePolicyRequest, Policy};
use crate::crash;
use crate::filter::{self, MAX_FILTER_DEPTH};
use crate::planmodifiers::{SuppressIfAttributeNotEquals, UnknownToNull};
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
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{StringLengthValidator, StringOneOfValidator};
use tfplug::{AttributeBuilder, AttributeType, SchemaBuilder};

pub const TYPE_NAME: &str = "cloudsec_cwp_policy";

const ACTION_BLOCK: &str = "block";
pub const ACTIONS: [&str; 2] = ["alert", ACTION_BLOCK];

#[derive(Default)]
pub struct CwpPolicyResource {
    provider_data: Option<CloudSecProviderData>,
}

impl CwpPolicyResource {
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
    ) -> Option<CreatePolicyRequest> {
        let name = required_string(plan, "name").map_err(|d| diagnostics.push(d)).ok();
        let action = required_string(plan, "action").map_err(|d| diagnostics.push(d)).ok();
        let description = optional_string(plan, "description", diagnostics);
        let block_message = optional_string(plan, "block_message", diagnostics);
        let enabled = plan
            .get_optional_bool(&AttributePath::new("enabled"))
            .unwrap_or_default()
            .unwrap_or(true);

        let scope_path = AttributePath::new("scope");
        let scope_value = plan.get(&scope_path).unwrap_or(Dynamic::Null);
        let start = diagnostics.len();
        let scope = filter::root_from_config(&scope_value, &scope_path, diagnostics);
        if diagnostics.len() > start {
            return None;
        }

        Some(CreatePolicyRequest {
            name: name?,
            description,
            action: action?,
            block_message,
            scope: filter::to_remote(scope.as_ref()),
            enabled,
        })
    }

    /// Create a policy from `plan`, returning its state
    async fn create_from_plan(
        &self,
        ctx: &Context,
        provider_data: &CloudSecProviderData,
        plan: &DynamicValue,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DynamicValue> {
        let body = self.request_from_plan(plan, diagnostics)?;

        match provider_data.client.cwp().create_policy(ctx, &body).await {
            Ok(policy) => {
                tracing::info!(id = %policy.id, name = %policy.name, "created cwp policy");
                state_from_policy(&policy, plan, false, diagnostics)
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to create CWP policy", &e));
                None
            }
        }
    }

    async fn create_policy(
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

        let new_state = self
            .create_from_plan(&ctx, provider_data, &request.planned_state, &mut diagnostics)
            .await
            .unwrap_or(request.planned_state);

        CreateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
        }
    }

    async fn read_policy(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
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

        match provider_data.client.cwp().get_policy(&ctx, &id).await {
            Ok(policy) => {
                let new_state = state_from_policy(&policy, &request.current_state, true, &mut diagnostics)
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
                diagnostics.push(api_diagnostic("Failed to read CWP policy", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
        }
    }

    async fn replace_policy(
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

        tracing::debug!(%id, "cwp policies cannot be updated, replacing");
        match provider_data.client.cwp().delete_policy(&ctx, &id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to replace CWP policy", &e));
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                };
            }
        }

        // The old policy is gone; a failed create leaves nothing to track
        let new_state = self
            .create_from_plan(&ctx, provider_data, &request.planned_state, &mut diagnostics)
            .await
            .unwrap_or_else(DynamicValue::null);

        UpdateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
        }
    }

    async fn delete_policy(
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

        match provider_data.client.cwp().delete_policy(&ctx, &id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(api_diagnostic("Failed to delete CWP policy", &e)),
        }

        DeleteResourceResponse { diagnostics }
    }
}

/// Full state for `policy`.
///
/// `last_triggered_at` is only refreshed on read; after create it keeps the
/// planned null.
fn state_from_policy(
    policy: &Policy,
    prior: &DynamicValue,
    refresh: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<DynamicValue> {
    let scope_path = AttributePath::new("scope");
    let prior_scope = prior.get(&scope_path).unwrap_or(Dynamic::Null);
    let scope = filter::from_remote(policy.scope.as_ref())
        .and_then(|root| filter::root_to_state(root.as_ref(), &prior_scope, MAX_FILTER_DEPTH));
    let scope = match scope {
        Ok(scope) => scope,
        Err(e) => {
            diagnostics.push(
                Diagnostic::error("Unsupported CWP policy scope", e.to_string())
                    .with_attribute(scope_path),
            );
            return None;
        }
    };

    let block_message = if policy.action == ACTION_BLOCK {
        match policy.block_message.as_deref() {
            Some(message) => Dynamic::from(message),
            None => prior
                .get_optional_string(&AttributePath::new("block_message"))
                .ok()
                .flatten()
                .map_or(Dynamic::Null, Dynamic::from),
        }
    } else {
        Dynamic::Null
    };

    let last_triggered_at = if refresh {
        optional_to_dynamic(policy.last_triggered_at.as_deref())
    } else {
        match prior.get(&AttributePath::new("last_triggered_at")) {
            Ok(Dynamic::Unknown) | Err(_) => Dynamic::Null,
            Ok(value) => value,
        }
    };

    Some(DynamicValue::new(Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::from(policy.id.as_str())),
        ("name".to_string(), Dynamic::from(policy.name.as_str())),
        (
            // Unset descriptions come back as ""; config cannot hold "" itself
            "description".to_string(),
            optional_to_dynamic(policy.description.as_deref().filter(|d| !d.is_empty())),
        ),
        ("action".to_string(), Dynamic::from(policy.action.as_str())),
        ("block_message".to_string(), block_message),
        ("scope".to_string(), scope),
        ("enabled".to_string(), Dynamic::Bool(policy.enabled)),
        ("last_triggered_at".to_string(), last_triggered_at),
    ]))))
}

#[async_trait]
impl Resource for CwpPolicyResource {
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
            .description("Manages a cloud workload protection runtime policy")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Policy identifier")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Policy name")
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
                AttributeBuilder::new("action", AttributeType::String)
                    .description("What happens when the policy matches: alert or block")
                    .required()
                    .validator(StringOneOfValidator::new(ACTIONS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("block_message", AttributeType::String)
                    .description("Message shown for blocked operations; only used with action block")
                    .optional()
                    .computed()
                    .plan_modifier(SuppressIfAttributeNotEquals::string(
                        AttributePath::new("action"),
                        ACTION_BLOCK,
                    ))
                    .build(),
            )
            .attribute(
                filter::filter_root_attribute("scope", MAX_FILTER_DEPTH)
                    .description("Workloads the policy applies to; all workloads when unset")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enabled", AttributeType::Bool)
                    .description("Whether the policy is enforced. Defaults to true")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("last_triggered_at", AttributeType::String)
                    .description("When the policy last matched, if ever")
                    .computed()
                    .plan_modifier(UnknownToNull)
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

        let action = request
            .config
            .get_optional_string(&AttributePath::new("action"))
            .ok()
            .flatten();
        let message_path = AttributePath::new("block_message");
        let message = request.config.get(&message_path).unwrap_or(Dynamic::Null);
        if matches!(&action, Some(action) if action != ACTION_BLOCK) && !message.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    "Conflicting policy settings",
                    "block_message can only be set when action is \"block\"",
                )
                .with_attribute(message_path),
            );
        }

        let scope_path = AttributePath::new("scope");
        let scope = request.config.get(&scope_path).unwrap_or(Dynamic::Null);
        filter::root_from_config(&scope, &scope_path, &mut diagnostics);

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let planned_state = request.planned_state.clone();
        crash::guard("cloudsec_cwp_policy create", self.crash_dir(), self.create_policy(ctx, request))
            .await
            .unwrap_or_else(|diag| CreateResourceResponse {
                new_state: planned_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let current_state = request.current_state.clone();
        crash::guard("cloudsec_cwp_policy read", self.crash_dir(), self.read_policy(ctx, request))
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
        crash::guard("cloudsec_cwp_policy update", self.crash_dir(), self.replace_policy(ctx, request))
            .await
            .unwrap_or_else(|diag| UpdateResourceResponse {
                new_state: prior_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        crash::guard("cloudsec_cwp_policy delete", self.crash_dir(), self.delete_policy(ctx, request))
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
impl ResourceWithConfigure for CwpPolicyResource {
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
