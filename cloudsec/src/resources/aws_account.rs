//! AWS cloud account resource implementation
//!
//! Connects an AWS account to CloudSec through a cross-account IAM role.
//! Name, regions and scan settings are patched in place; the account id and
//! role ARN identify the connection and force replacement.

use crate::api::cloudonboarding::{
    AgentlessScanning, CloudAccount, CreateCloudAccountRequest, UpdateCloudAccountRequest,
};
use crate::crash;
use crate::planmodifiers::{SuppressIfAttributeEquals, UseStateIfConfigUnchanged};
use crate::provider_data::CloudSecProviderData;
use crate::resources::{
    api_diagnostic, not_configured, optional_string, optional_to_dynamic, required_string,
    string_list, strings_to_dynamic,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    UpdateResourceRequest, UpdateResourceResponse, ValidateResourceConfigRequest,
    ValidateResourceConfigResponse,
};
use tfplug::schema::{NestedType, ObjectNestingMode};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{StringLengthValidator, StringOneOfValidator, StringPatternValidator};
use tfplug::{AttributeBuilder, AttributeType, SchemaBuilder};

pub const TYPE_NAME: &str = "cloudsec_aws_account";

const CLOUD_PROVIDER: &str = "aws";
const SCAN_MODE_DISABLED: &str = "disabled";
pub const SCAN_MODES: [&str; 3] = [SCAN_MODE_DISABLED, "agentless", "agent"];

const ACCOUNT_ID_PATTERN: &str = r"^\d{12}$";
const ROLE_ARN_PATTERN: &str = r"^arn:aws[a-z-]*:iam::\d{12}:role/.+$";

#[derive(Default)]
pub struct AwsAccountResource {
    provider_data: Option<CloudSecProviderData>,
}

impl AwsAccountResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn crash_dir(&self) -> Option<&std::path::Path> {
        self.provider_data.as_ref().and_then(|d| d.crash_dir())
    }

    fn create_request(
        &self,
        plan: &DynamicValue,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<CreateCloudAccountRequest> {
        let mut required = |name: &str| match required_string(plan, name) {
            Ok(value) => Some(value),
            Err(diag) => {
                diagnostics.push(diag);
                None
            }
        };
        let account_id = required("account_id");
        let name = required("name");
        let role_arn = required("role_arn");

        let regions = string_list(plan, "regions", diagnostics).unwrap_or_default();
        let scan_mode = optional_string(plan, "scan_mode", diagnostics);
        let agentless_scanning = agentless_from_plan(plan, diagnostics);

        Some(CreateCloudAccountRequest {
            cloud_provider: CLOUD_PROVIDER.to_string(),
            account_id: account_id?,
            name: name?,
            role_arn: role_arn?,
            regions,
            scan_mode,
            agentless_scanning,
        })
    }

    fn update_request(
        &self,
        plan: &DynamicValue,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<UpdateCloudAccountRequest> {
        let name = match required_string(plan, "name") {
            Ok(name) => name,
            Err(diag) => {
                diagnostics.push(diag);
                return None;
            }
        };

        Some(UpdateCloudAccountRequest {
            name: Some(name),
            regions: string_list(plan, "regions", diagnostics),
            scan_mode: optional_string(plan, "scan_mode", diagnostics),
            agentless_scanning: agentless_from_plan(plan, diagnostics),
        })
    }

    async fn create_account(
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

        let Some(body) = self.create_request(&request.planned_state, &mut diagnostics) else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics,
            };
        };

        match provider_data
            .client
            .cloud_onboarding()
            .create_account(&ctx, &body)
            .await
        {
            Ok(account) => {
                tracing::info!(id = %account.id, account_id = %account.account_id, "connected aws account");
                CreateResourceResponse {
                    new_state: state_from_account(&account, &request.planned_state),
                    private: vec![],
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to create AWS account", &e));
                CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                }
            }
        }
    }

    async fn read_account(
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

        match provider_data
            .client
            .cloud_onboarding()
            .get_account(&ctx, &id)
            .await
        {
            Ok(account) => ReadResourceResponse {
                new_state: Some(state_from_account(&account, &request.current_state)),
                diagnostics,
                private: request.private,
                deferred: None,
            },
            Err(e) if e.is_not_found() => {
                tracing::info!(%id, "aws account no longer exists, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to read AWS account", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                    deferred: None,
                }
            }
        }
    }

    async fn update_account(
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

        let Some(body) = self.update_request(&request.planned_state, &mut diagnostics) else {
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        };

        match provider_data
            .client
            .cloud_onboarding()
            .update_account(&ctx, &id, &body)
            .await
        {
            Ok(account) => UpdateResourceResponse {
                new_state: state_from_account(&account, &request.planned_state),
                private: vec![],
                diagnostics,
            },
            Err(e) => {
                diagnostics.push(api_diagnostic("Failed to update AWS account", &e));
                UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                }
            }
        }
    }

    async fn delete_account(
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

        match provider_data
            .client
            .cloud_onboarding()
            .delete_account(&ctx, &id)
            .await
        {
            Ok(()) => tracing::info!(%id, "disconnected aws account"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(api_diagnostic("Failed to delete AWS account", &e)),
        }

        DeleteResourceResponse { diagnostics }
    }
}

/// Agentless settings from a planned object; `None` when null or unknown
fn agentless_from_plan(
    plan: &DynamicValue,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<AgentlessScanning> {
    let path = AttributePath::new("agentless_scanning");
    let interval_path = path.clone().attribute("scan_interval_hours");
    let stopped_path = path.clone().attribute("include_stopped_instances");

    match plan.get_optional_map(&path) {
        Ok(Some(_)) => {}
        Ok(None) => return None,
        Err(e) => {
            diagnostics.push(Diagnostic::error("Invalid attribute", e.to_string()).with_attribute(path));
            return None;
        }
    }

    let scan_interval_hours = plan
        .get_optional_number(&interval_path)
        .map_err(|e| {
            diagnostics.push(
                Diagnostic::error("Invalid attribute", e.to_string()).with_attribute(interval_path),
            )
        })
        .ok()
        .flatten()
        .map(|n| n as i64);
    let include_stopped_instances = plan
        .get_optional_bool(&stopped_path)
        .map_err(|e| {
            diagnostics.push(
                Diagnostic::error("Invalid attribute", e.to_string()).with_attribute(stopped_path),
            )
        })
        .ok()
        .flatten();

    Some(AgentlessScanning {
        scan_interval_hours,
        include_stopped_instances,
    })
}

/// Agentless settings for state.
///
/// Null while scanning is disabled. Fields left null in `prior` stay null so
/// API defaults for unset fields do not show up as drift.
fn agentless_to_state(
    remote: Option<&AgentlessScanning>,
    scan_mode: &Dynamic,
    prior: &Dynamic,
) -> Dynamic {
    if scan_mode.as_str() == Some(SCAN_MODE_DISABLED) {
        return Dynamic::Null;
    }
    let Some(remote) = remote else {
        return Dynamic::Null;
    };

    let interval = remote
        .scan_interval_hours
        .map_or(Dynamic::Null, |n| Dynamic::Number(n as f64));
    let stopped = remote
        .include_stopped_instances
        .map_or(Dynamic::Null, Dynamic::Bool);

    let keep = |name: &str, value: Dynamic| match prior.as_map().and_then(|m| m.get(name)) {
        Some(Dynamic::Null) => Dynamic::Null,
        _ => value,
    };

    Dynamic::Map(HashMap::from([
        (
            "scan_interval_hours".to_string(),
            keep("scan_interval_hours", interval),
        ),
        (
            "include_stopped_instances".to_string(),
            keep("include_stopped_instances", stopped),
        ),
    ]))
}

/// Remote string, falling back to a known prior value the API did not echo
fn remote_or_prior(remote: Option<&str>, prior: &DynamicValue, name: &str) -> Dynamic {
    match remote {
        Some(value) => Dynamic::from(value),
        None => prior
            .get_optional_string(&AttributePath::new(name))
            .ok()
            .flatten()
            .map_or(Dynamic::Null, Dynamic::from),
    }
}

fn state_from_account(account: &CloudAccount, prior: &DynamicValue) -> DynamicValue {
    let scan_mode = remote_or_prior(account.scan_mode.as_deref(), prior, "scan_mode");
    let role_arn = remote_or_prior(account.role_arn.as_deref(), prior, "role_arn");
    let prior_agentless = prior
        .get(&AttributePath::new("agentless_scanning"))
        .unwrap_or(Dynamic::Null);
    let agentless = agentless_to_state(
        account.agentless_scanning.as_ref(),
        &scan_mode,
        &prior_agentless,
    );

    DynamicValue::new(Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::from(account.id.as_str())),
        ("account_id".to_string(), Dynamic::from(account.account_id.as_str())),
        ("name".to_string(), Dynamic::from(account.name.as_str())),
        ("role_arn".to_string(), role_arn),
        ("regions".to_string(), strings_to_dynamic(&account.regions)),
        ("scan_mode".to_string(), scan_mode),
        ("agentless_scanning".to_string(), agentless),
        ("status".to_string(), optional_to_dynamic(account.status.as_deref())),
    ])))
}

fn pattern_validator(pattern: &str, description: &str) -> Option<StringPatternValidator> {
    regex::Regex::new(pattern)
        .ok()
        .map(|pattern| StringPatternValidator {
            pattern,
            description: description.to_string(),
        })
}

#[async_trait]
impl Resource for AwsAccountResource {
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
        let mut account_id = AttributeBuilder::new("account_id", AttributeType::String)
            .description("12-digit AWS account ID")
            .required()
            .plan_modifier(RequiresReplace);
        if let Some(validator) = pattern_validator(ACCOUNT_ID_PATTERN, "a 12-digit account ID") {
            account_id = account_id.validator(validator);
        }

        let mut role_arn = AttributeBuilder::new("role_arn", AttributeType::String)
            .description("ARN of the IAM role CloudSec assumes in the account")
            .required()
            .plan_modifier(RequiresReplace);
        if let Some(validator) = pattern_validator(ROLE_ARN_PATTERN, "an IAM role ARN") {
            role_arn = role_arn.validator(validator);
        }

        let agentless = NestedType::new(
            ObjectNestingMode::Single,
            vec![
                AttributeBuilder::new("scan_interval_hours", AttributeType::Number)
                    .description("Hours between agentless scans")
                    .optional()
                    .build(),
                AttributeBuilder::new("include_stopped_instances", AttributeType::Bool)
                    .description("Also scan stopped instances")
                    .optional()
                    .build(),
            ],
        );

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Connects an AWS account to CloudSec")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("CloudSec identifier of the connected account")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(account_id.build())
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Display name")
                    .required()
                    .validator(StringLengthValidator {
                        min: Some(1),
                        max: Some(128),
                    })
                    .build(),
            )
            .attribute(role_arn.build())
            .attribute(
                AttributeBuilder::new("regions", AttributeType::List(Box::new(AttributeType::String)))
                    .description("Regions to scan; all enabled regions when unset")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("scan_mode", AttributeType::String)
                    .description("One of disabled, agentless or agent")
                    .optional()
                    .computed()
                    .validator(StringOneOfValidator::new(SCAN_MODES))
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::nested("agentless_scanning", agentless)
                    .description("Agentless scanning settings; null while scan_mode is disabled")
                    .optional()
                    .computed()
                    .plan_modifier(SuppressIfAttributeEquals::string(
                        AttributePath::new("scan_mode"),
                        SCAN_MODE_DISABLED,
                    ))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .description("Connection status reported by CloudSec")
                    .computed()
                    .plan_modifier(UseStateIfConfigUnchanged::new(vec![
                        AttributePath::new("name"),
                        AttributePath::new("regions"),
                        AttributePath::new("scan_mode"),
                    ]))
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
        let scan_mode = request
            .config
            .get_optional_string(&AttributePath::new("scan_mode"))
            .ok()
            .flatten();
        let agentless_path = AttributePath::new("agentless_scanning");
        let agentless = request.config.get(&agentless_path).unwrap_or(Dynamic::Null);

        if scan_mode.as_deref() == Some(SCAN_MODE_DISABLED) && !agentless.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    "Conflicting scan settings",
                    "agentless_scanning cannot be set while scan_mode is \"disabled\"",
                )
                .with_attribute(agentless_path),
            );
        }

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let planned_state = request.planned_state.clone();
        crash::guard("cloudsec_aws_account create", self.crash_dir(), self.create_account(ctx, request))
            .await
            .unwrap_or_else(|diag| CreateResourceResponse {
                new_state: planned_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let current_state = request.current_state.clone();
        crash::guard("cloudsec_aws_account read", self.crash_dir(), self.read_account(ctx, request))
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
        crash::guard("cloudsec_aws_account update", self.crash_dir(), self.update_account(ctx, request))
            .await
            .unwrap_or_else(|diag| UpdateResourceResponse {
                new_state: prior_state,
                private: vec![],
                diagnostics: vec![diag],
            })
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        crash::guard("cloudsec_aws_account delete", self.crash_dir(), self.delete_account(ctx, request))
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
impl ResourceWithConfigure for AwsAccountResource {
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
