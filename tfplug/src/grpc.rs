//! gRPC service implementation of the Terraform plugin protocol v6
//!
//! Resources and data sources are created per request through the provider's
//! factories and configured with the provider data from ConfigureProvider.
//! Schemas are collected once and cached for the lifetime of the server.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::plan_modifier::{values_equal, PlanModifyRequest};
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderMetaSchemaRequest,
    ProviderMetadataRequest, ProviderSchemaRequest, ResourceFactory, StopProviderRequest,
    ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{Attribute, ObjectNestingMode, Schema, StringKind};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, Diagnostic,
    DiagnosticSeverity, Dynamic, DynamicValue, ServerCapabilities,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tonic::{Request, Response, Status};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

struct SchemaCache {
    provider: Schema,
    provider_meta: Option<Schema>,
    resources: HashMap<String, Schema>,
    data_sources: HashMap<String, Schema>,
    diagnostics: Vec<Diagnostic>,
}

pub struct GrpcProviderServer<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<ProviderData>>,
    resources: HashMap<String, ResourceFactory>,
    data_sources: HashMap<String, DataSourceFactory>,
    schemas: OnceCell<SchemaCache>,
    root: Context,
}

impl<P: Provider + 'static> GrpcProviderServer<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();

        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            resources,
            data_sources,
            schemas: OnceCell::new(),
            root: Context::new(),
        }
    }

    /// Root context of the server; cancelled by StopProvider
    pub fn context(&self) -> Context {
        self.root.clone()
    }

    async fn schemas(&self) -> &SchemaCache {
        self.schemas
            .get_or_init(|| async {
                let ctx = self.root.child();
                let provider = self.provider.read().await;

                let provider_schema = provider.schema(ctx.clone(), ProviderSchemaRequest).await;
                let meta_schema = provider
                    .meta_schema(ctx.clone(), ProviderMetaSchemaRequest)
                    .await;

                let mut diagnostics = provider_schema.diagnostics;
                diagnostics.extend(meta_schema.diagnostics);

                let mut resources = HashMap::new();
                for (name, factory) in &self.resources {
                    let response = factory().schema(ctx.clone(), ResourceSchemaRequest).await;
                    diagnostics.extend(response.diagnostics);
                    resources.insert(name.clone(), response.schema);
                }

                let mut data_sources = HashMap::new();
                for (name, factory) in &self.data_sources {
                    let response = factory().schema(ctx.clone(), DataSourceSchemaRequest).await;
                    diagnostics.extend(response.diagnostics);
                    data_sources.insert(name.clone(), response.schema);
                }

                tracing::debug!(
                    resources = resources.len(),
                    data_sources = data_sources.len(),
                    "provider schemas loaded"
                );

                SchemaCache {
                    provider: provider_schema.schema,
                    provider_meta: meta_schema.schema,
                    resources,
                    data_sources,
                    diagnostics,
                }
            })
            .await
    }

    /// Instantiate and configure a resource, returning configure diagnostics
    async fn resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<(Box<dyn ResourceWithConfigure>, Vec<Diagnostic>), Vec<Diagnostic>> {
        let factory = self.resources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown resource type",
                format!("The provider does not support resource type {}", type_name),
            )]
        })?;

        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(ctx.clone(), ConfigureResourceRequest { provider_data })
            .await;

        Ok((resource, response.diagnostics))
    }

    async fn data_source(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<(Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>), Vec<Diagnostic>> {
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown data source type",
                format!("The provider does not support data source type {}", type_name),
            )]
        })?;

        let mut data_source = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(ctx.clone(), ConfigureDataSourceRequest { provider_data })
            .await;

        Ok((data_source, response.diagnostics))
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::provider_server::Provider for GrpcProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> Result<Response<proto::get_metadata::Response>, Status> {
        let metadata = self
            .provider
            .read()
            .await
            .metadata(self.root.child(), ProviderMetadataRequest)
            .await;

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities_to_proto(&metadata.server_capabilities)),
            diagnostics: vec![],
            data_sources: self
                .data_sources
                .keys()
                .map(|name| proto::get_metadata::DataSourceMetadata {
                    type_name: name.clone(),
                })
                .collect(),
            resources: self
                .resources
                .keys()
                .map(|name| proto::get_metadata::ResourceMetadata {
                    type_name: name.clone(),
                })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        let schemas = self.schemas().await;
        let metadata = self
            .provider
            .read()
            .await
            .metadata(self.root.child(), ProviderMetadataRequest)
            .await;

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&schemas.provider)),
            resource_schemas: schemas
                .resources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            data_source_schemas: schemas
                .data_sources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            diagnostics: diagnostics_to_proto(&schemas.diagnostics),
            provider_meta: schemas.provider_meta.as_ref().map(schema_to_proto),
            server_capabilities: Some(server_capabilities_to_proto(&metadata.server_capabilities)),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        let schemas = self.schemas().await;

        let mut diagnostics = Vec::new();
        validate_attributes(
            &schemas.provider.block.attributes,
            &config,
            &AttributePath::root(),
            &mut diagnostics,
        );

        let response = self
            .provider
            .read()
            .await
            .validate(self.root.child(), ValidateProviderConfigRequest { config })
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        let ctx = self.root.child();

        let mut diagnostics = Vec::new();
        if let Some(schema) = self.schemas().await.resources.get(&req.type_name) {
            validate_attributes(
                &schema.block.attributes,
                &config,
                &AttributePath::root(),
                &mut diagnostics,
            );
        }

        // Validation runs before ConfigureProvider, so resources see no provider data here
        match self.resources.get(&req.type_name) {
            Some(factory) => {
                let response = factory()
                    .validate(
                        ctx,
                        ValidateResourceConfigRequest {
                            type_name: req.type_name,
                            config,
                            client_capabilities: client_capabilities_from_proto(
                                req.client_capabilities,
                            ),
                        },
                    )
                    .await;
                diagnostics.extend(response.diagnostics);
            }
            None => diagnostics.push(Diagnostic::error(
                "Unknown resource type",
                format!("The provider does not support resource type {}", req.type_name),
            )),
        }

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        let ctx = self.root.child();

        let mut diagnostics = Vec::new();
        if let Some(schema) = self.schemas().await.data_sources.get(&req.type_name) {
            validate_attributes(
                &schema.block.attributes,
                &config,
                &AttributePath::root(),
                &mut diagnostics,
            );
        }

        match self.data_sources.get(&req.type_name) {
            Some(factory) => {
                let response = factory()
                    .validate(
                        ctx,
                        ValidateDataSourceConfigRequest {
                            type_name: req.type_name,
                            config,
                        },
                    )
                    .await;
                diagnostics.extend(response.diagnostics);
            }
            None => diagnostics.push(Diagnostic::error(
                "Unknown data source type",
                format!(
                    "The provider does not support data source type {}",
                    req.type_name
                ),
            )),
        }

        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let Some(schema) = self.schemas().await.resources.get(&req.type_name) else {
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(&[Diagnostic::error(
                    "Unknown resource type",
                    format!("The provider does not support resource type {}", req.type_name),
                )]),
            }));
        };

        let mut diagnostics = Vec::new();
        let raw = req.raw_state.unwrap_or_default();

        let upgraded = if req.version != schema.version {
            diagnostics.push(Diagnostic::error(
                "Unable to upgrade resource state",
                format!(
                    "{} has no upgrade path from schema version {} to {}",
                    req.type_name, req.version, schema.version
                ),
            ));
            None
        } else if !raw.json.is_empty() {
            match DynamicValue::decode_json(&raw.json) {
                Ok(state) => Some(conform_to_schema(state, &schema.block.attributes)),
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        "Unable to read prior state",
                        e.to_string(),
                    ));
                    None
                }
            }
        } else if !raw.flatmap.is_empty() {
            diagnostics.push(Diagnostic::error(
                "Unable to upgrade resource state",
                "Legacy flatmap state is not supported",
            ));
            None
        } else {
            Some(DynamicValue::null())
        };

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: upgraded.as_ref().map(encode_dynamic_value).transpose()?,
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;

        tracing::info!(terraform_version = %req.terraform_version, "configuring provider");

        let response = self
            .provider
            .write()
            .await
            .configure(
                self.root.child(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                    client_capabilities: client_capabilities_from_proto(req.client_capabilities),
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let ctx = self.root.child();
        let current_state = decode_dynamic_value(req.current_state)?;
        let provider_meta = decode_optional(req.provider_meta)?;

        let (resource, mut diagnostics) = match self.resource(&ctx, &req.type_name).await {
            Ok(found) => found,
            Err(diagnostics) => {
                return Ok(Response::new(proto::read_resource::Response {
                    new_state: Some(encode_dynamic_value(&current_state)?),
                    diagnostics: diagnostics_to_proto(&diagnostics),
                    private: req.private,
                    deferred: None,
                }))
            }
        };
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: Some(encode_dynamic_value(&current_state)?),
                diagnostics: diagnostics_to_proto(&diagnostics),
                private: req.private,
                deferred: None,
            }));
        }

        let response = resource
            .read(
                ctx,
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private,
                    provider_meta,
                    client_capabilities: client_capabilities_from_proto(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let new_state = match response.new_state {
            Some(state) => state,
            None if has_errors(&diagnostics) => current_state,
            None => {
                tracing::info!(type_name = %req.type_name, "resource no longer exists, removing from state");
                DynamicValue::null()
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            diagnostics: diagnostics_to_proto(&diagnostics),
            private: response.private,
            deferred: None,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic_value(req.prior_state)?;
        let proposed = decode_dynamic_value(req.proposed_new_state)?;
        let config = decode_dynamic_value(req.config)?;

        // Destroy plans carry no new state
        if proposed.is_null() {
            return Ok(Response::new(proto::plan_resource_change::Response {
                planned_state: Some(encode_dynamic_value(&proposed)?),
                requires_replace: vec![],
                planned_private: req.prior_private,
                diagnostics: vec![],
                legacy_type_system: false,
                deferred: None,
            }));
        }

        let Some(schema) = self.schemas().await.resources.get(&req.type_name) else {
            return Ok(Response::new(proto::plan_resource_change::Response {
                planned_state: Some(encode_dynamic_value(&proposed)?),
                requires_replace: vec![],
                planned_private: req.prior_private,
                diagnostics: diagnostics_to_proto(&[Diagnostic::error(
                    "Unknown resource type",
                    format!("The provider does not support resource type {}", req.type_name),
                )]),
                legacy_type_system: false,
                deferred: None,
            }));
        };

        let mut planned = proposed.clone();
        let mut diagnostics = Vec::new();
        let mut requires_replace: Vec<AttributePath> = Vec::new();

        // Computed values may change whenever the resource does
        if prior_state.is_null() || !values_equal(&prior_state.value, &proposed.value) {
            for attribute in schema.block.attributes.iter().filter(|a| a.computed) {
                let path = AttributePath::new(&attribute.name);
                let configured = config.get(&path).unwrap_or(Dynamic::Null);
                if configured.is_null() {
                    if let Err(e) = planned.mark_unknown(&path) {
                        diagnostics.push(
                            Diagnostic::error("Failed to plan computed attribute", e.to_string())
                                .with_attribute(path),
                        );
                    }
                }
            }
        }

        for attribute in &schema.block.attributes {
            let path = AttributePath::new(&attribute.name);
            for modifier in &attribute.plan_modifiers {
                let modify_request = PlanModifyRequest::new(
                    path.clone(),
                    config.clone(),
                    prior_state.clone(),
                    planned.clone(),
                );
                let response = modifier.modify_plan(&modify_request);

                if let Err(e) = planned.set_value(&path, response.plan_value) {
                    diagnostics.push(
                        Diagnostic::error("Failed to apply plan modifier", e.to_string())
                            .with_attribute(path.clone()),
                    );
                }
                if response.requires_replace && !requires_replace.contains(&path) {
                    requires_replace.push(path.clone());
                }
                diagnostics.extend(response.diagnostics);
            }
        }

        tracing::debug!(
            type_name = %req.type_name,
            requires_replace = requires_replace.len(),
            "planned resource change"
        );

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_dynamic_value(&planned)?),
            requires_replace: requires_replace.iter().map(path_to_proto).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
            deferred: None,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let ctx = self.root.child();
        let prior_state = decode_dynamic_value(req.prior_state)?;
        let planned_state = decode_dynamic_value(req.planned_state)?;
        let config = decode_dynamic_value(req.config)?;
        let provider_meta = decode_optional(req.provider_meta)?;

        let (resource, mut diagnostics) = match self.resource(&ctx, &req.type_name).await {
            Ok(found) => found,
            Err(diagnostics) => {
                return Ok(Response::new(proto::apply_resource_change::Response {
                    new_state: Some(encode_dynamic_value(&prior_state)?),
                    private: req.planned_private,
                    diagnostics: diagnostics_to_proto(&diagnostics),
                    legacy_type_system: false,
                }))
            }
        };
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::apply_resource_change::Response {
                new_state: Some(encode_dynamic_value(&prior_state)?),
                private: req.planned_private,
                diagnostics: diagnostics_to_proto(&diagnostics),
                legacy_type_system: false,
            }));
        }

        let (new_state, private) = if planned_state.is_null() {
            tracing::info!(type_name = %req.type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);

            if has_errors(&diagnostics) {
                (prior_state, req.planned_private)
            } else {
                (DynamicValue::null(), Vec::new())
            }
        } else if prior_state.is_null() {
            tracing::info!(type_name = %req.type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name: req.type_name.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);

            // A failed create only keeps state the resource fully resolved
            if has_errors(&diagnostics) && response.new_state.value.contains_unknown() {
                (DynamicValue::null(), Vec::new())
            } else {
                (response.new_state, response.private)
            }
        } else {
            tracing::info!(type_name = %req.type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);

            if has_errors(&diagnostics) && response.new_state.value.contains_unknown() {
                (prior_state, response.private)
            } else {
                (response.new_state, response.private)
            }
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let ctx = self.root.child();

        let (resource, mut diagnostics) = match self.resource(&ctx, &req.type_name).await {
            Ok(found) => found,
            Err(diagnostics) => {
                return Ok(Response::new(proto::import_resource_state::Response {
                    imported_resources: vec![],
                    diagnostics: diagnostics_to_proto(&diagnostics),
                    deferred: None,
                }))
            }
        };
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(&diagnostics),
                deferred: None,
            }));
        }

        let response = resource
            .import_state(
                ctx,
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                    client_capabilities: client_capabilities_from_proto(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_dynamic_value(&imported.state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(&diagnostics),
            deferred: None,
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        let ctx = self.root.child();
        let config = decode_dynamic_value(req.config)?;
        let provider_meta = decode_optional(req.provider_meta)?;

        let (data_source, mut diagnostics) = match self.data_source(&ctx, &req.type_name).await {
            Ok(found) => found,
            Err(diagnostics) => {
                return Ok(Response::new(proto::read_data_source::Response {
                    state: None,
                    diagnostics: diagnostics_to_proto(&diagnostics),
                    deferred: None,
                }))
            }
        };
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_data_source::Response {
                state: None,
                diagnostics: diagnostics_to_proto(&diagnostics),
                deferred: None,
            }));
        }

        let response = data_source
            .read(
                ctx,
                ReadDataSourceRequest {
                    type_name: req.type_name,
                    config,
                    provider_meta,
                    client_capabilities: client_capabilities_from_proto(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_dynamic_value(&response.state)?),
            diagnostics: diagnostics_to_proto(&diagnostics),
            deferred: None,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> Result<Response<proto::stop_provider::Response>, Status> {
        tracing::info!("stop requested, cancelling in-flight requests");
        self.root.cancel();

        // Terraform expects StopProvider to return while operations wind down
        let response = match self.provider.try_read() {
            Ok(provider) => provider.stop(self.root.clone(), StopProviderRequest).await,
            Err(_) => crate::provider::StopProviderResponse { error: None },
        };

        Ok(Response::new(proto::stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }))
    }
}

/// Run attribute validators against known values, descending into nested attributes
fn validate_attributes(
    attributes: &[Attribute],
    config: &DynamicValue,
    prefix: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for attribute in attributes {
        let mut path = prefix.clone();
        path.steps
            .push(AttributePathStep::AttributeName(attribute.name.clone()));

        let value = match config.lookup(&path) {
            Ok(Some(value)) if !value.is_null() && !value.is_unknown() => value.clone(),
            _ => continue,
        };

        for validator in &attribute.validators {
            validator.validate(&value, &path, diagnostics);
        }

        if let Some(nested) = &attribute.nested_type {
            match (&value, nested.nesting) {
                (Dynamic::Map(_), ObjectNestingMode::Single) => {
                    validate_attributes(&nested.attributes, config, &path, diagnostics);
                }
                (Dynamic::List(items), ObjectNestingMode::List | ObjectNestingMode::Set) => {
                    for idx in 0..items.len() {
                        let element = path.clone().index(idx as i64);
                        validate_attributes(&nested.attributes, config, &element, diagnostics);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Keep only attributes the schema declares and fill the missing ones with null
fn conform_to_schema(state: DynamicValue, attributes: &[Attribute]) -> DynamicValue {
    match state.value {
        Dynamic::Map(mut values) => DynamicValue::new(Dynamic::Map(
            attributes
                .iter()
                .map(|a| {
                    let value = values.remove(&a.name).unwrap_or(Dynamic::Null);
                    (a.name.clone(), value)
                })
                .collect(),
        )),
        other => DynamicValue::new(other),
    }
}

#[allow(clippy::result_large_err)]
fn decode_dynamic_value(value: Option<proto::DynamicValue>) -> Result<DynamicValue, Status> {
    let Some(value) = value else {
        return Ok(DynamicValue::null());
    };

    if !value.msgpack.is_empty() {
        DynamicValue::decode_msgpack(&value.msgpack).map_err(Status::from)
    } else if !value.json.is_empty() {
        DynamicValue::decode_json(&value.json).map_err(Status::from)
    } else {
        Ok(DynamicValue::null())
    }
}

#[allow(clippy::result_large_err)]
fn decode_optional(value: Option<proto::DynamicValue>) -> Result<Option<DynamicValue>, Status> {
    let decoded = decode_dynamic_value(value)?;
    Ok((!decoded.is_null()).then_some(decoded))
}

#[allow(clippy::result_large_err)]
fn encode_dynamic_value(value: &DynamicValue) -> Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

fn diagnostics_to_proto(diagnostics: &[Diagnostic]) -> Vec<proto::Diagnostic> {
    diagnostics
        .iter()
        .map(|diag| proto::Diagnostic {
            severity: match diag.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            } as i32,
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            attribute: diag.attribute.as_ref().map(path_to_proto),
        })
        .collect()
}

fn server_capabilities_to_proto(caps: &ServerCapabilities) -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: caps.plan_destroy,
        get_provider_schema_optional: caps.get_provider_schema_optional,
        move_resource_state: caps.move_resource_state,
    }
}

fn client_capabilities_from_proto(caps: Option<proto::ClientCapabilities>) -> ClientCapabilities {
    caps.map(|c| ClientCapabilities {
        deferral_allowed: c.deferral_allowed,
        write_only_attributes_allowed: c.write_only_attributes_allowed,
    })
    .unwrap_or_default()
}

fn string_kind_to_proto(kind: StringKind) -> i32 {
    match kind {
        StringKind::Plain => proto::StringKind::Plain as i32,
        StringKind::Markdown => proto::StringKind::Markdown as i32,
    }
}

fn attribute_to_proto(attribute: &Attribute) -> proto::schema::Attribute {
    let (r#type, nested_type) = match &attribute.nested_type {
        Some(nested) => (
            Vec::new(),
            Some(proto::schema::Object {
                attributes: nested.attributes.iter().map(attribute_to_proto).collect(),
                nesting: match nested.nesting {
                    ObjectNestingMode::Invalid => proto::schema::object::NestingMode::Invalid,
                    ObjectNestingMode::Single => proto::schema::object::NestingMode::Single,
                    ObjectNestingMode::List => proto::schema::object::NestingMode::List,
                    ObjectNestingMode::Set => proto::schema::object::NestingMode::Set,
                    ObjectNestingMode::Map => proto::schema::object::NestingMode::Map,
                } as i32,
            }),
        ),
        None => (attribute.r#type.to_type_json().to_string().into_bytes(), None),
    };

    proto::schema::Attribute {
        name: attribute.name.clone(),
        r#type,
        nested_type,
        description: attribute.description.clone(),
        required: attribute.required,
        optional: attribute.optional,
        computed: attribute.computed,
        sensitive: attribute.sensitive,
        description_kind: string_kind_to_proto(StringKind::Plain),
        deprecated: attribute.deprecated,
        write_only: false,
    }
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.block.version,
            attributes: schema.block.attributes.iter().map(attribute_to_proto).collect(),
            block_types: vec![],
            description: schema.block.description.clone(),
            description_kind: string_kind_to_proto(schema.block.description_kind),
            deprecated: schema.block.deprecated,
        }),
    }
}
