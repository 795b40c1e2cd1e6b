//! Drives GrpcProviderServer through the generated service trait

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::proto;
use tfplug::proto::provider_server::Provider as _;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory, ValidateProviderConfigRequest,
    ValidateProviderConfigResponse,
};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest,
    UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue, ServerCapabilities};
use tfplug::validator::StringLengthValidator;
use tfplug::GrpcProviderServer;
use tonic::Request;

type Store = Arc<Mutex<HashMap<String, String>>>;

struct NotesProvider {
    store: Store,
}

#[async_trait]
impl Provider for NotesProvider {
    fn type_name(&self) -> &str {
        "notes"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "notes".to_string(),
            server_capabilities: ServerCapabilities::default(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new().build(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(self.store.clone() as Arc<dyn std::any::Any + Send + Sync>),
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: vec![],
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "notes_note".to_string(),
            Box::new(|| Box::new(NoteResource { store: None }) as Box<dyn ResourceWithConfigure>),
        );
        factories
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        HashMap::new()
    }
}

struct NoteResource {
    store: Option<Store>,
}

impl NoteResource {
    fn store(&self) -> Result<&Store, Diagnostic> {
        self.store
            .as_ref()
            .ok_or_else(|| Diagnostic::error("Provider not configured", ""))
    }
}

#[async_trait]
impl Resource for NoteResource {
    fn type_name(&self) -> &str {
        "notes_note"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: "notes_note".to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("id", AttributeType::String)
                        .computed()
                        .plan_modifier(UseStateForUnknown)
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("text", AttributeType::String)
                        .required()
                        .validator(StringLengthValidator {
                            min: Some(1),
                            max: None,
                        })
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("folder", AttributeType::String)
                        .optional()
                        .plan_modifier(RequiresReplace)
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("revision", AttributeType::Number)
                        .computed()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let mut state = request.planned_state;
        let mut diagnostics = vec![];

        match self.store() {
            Ok(store) => {
                let text = request.config.get_string(&AttributePath::new("text")).unwrap();
                store.lock().unwrap().insert("n-1".to_string(), text);
                state
                    .set_string(&AttributePath::new("id"), "n-1".to_string())
                    .unwrap();
                state.set_number(&AttributePath::new("revision"), 1.0).unwrap();
            }
            Err(diag) => diagnostics.push(diag),
        }

        CreateResourceResponse {
            new_state: state,
            private: vec![],
            diagnostics,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let id = request
            .current_state
            .get_string(&AttributePath::new("id"))
            .unwrap();
        let exists = self
            .store()
            .map(|s| s.lock().unwrap().contains_key(&id))
            .unwrap_or(false);

        ReadResourceResponse {
            new_state: exists.then_some(request.current_state),
            diagnostics: vec![],
            private: request.private,
            deferred: None,
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut state = request.planned_state;
        state.set_number(&AttributePath::new("revision"), 2.0).unwrap();
        UpdateResourceResponse {
            new_state: state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let id = request.prior_state.get_string(&AttributePath::new("id")).unwrap();
        if let Ok(store) = self.store() {
            store.lock().unwrap().remove(&id);
        }
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl ResourceWithConfigure for NoteResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        self.store = request
            .provider_data
            .and_then(|data| data.downcast::<Mutex<HashMap<String, String>>>().ok());
        ConfigureResourceResponse {
            diagnostics: vec![],
        }
    }
}

fn server() -> (GrpcProviderServer<NotesProvider>, Store) {
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    (
        GrpcProviderServer::new(NotesProvider {
            store: store.clone(),
        }),
        store,
    )
}

fn encode(value: &DynamicValue) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: value.encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn decode(value: Option<proto::DynamicValue>) -> DynamicValue {
    DynamicValue::decode_msgpack(&value.unwrap().msgpack).unwrap()
}

fn note(fields: &[(&str, Dynamic)]) -> DynamicValue {
    let mut value = DynamicValue::object();
    for name in ["id", "text", "folder", "revision"] {
        value.set_null(&AttributePath::new(name)).unwrap();
    }
    for (name, field) in fields {
        value.set_value(&AttributePath::new(name), field.clone()).unwrap();
    }
    value
}

async fn configure(server: &GrpcProviderServer<NotesProvider>) {
    server
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: encode(&DynamicValue::object()),
            client_capabilities: None,
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn schema_lists_resource_with_encoded_types() {
    let (server, _) = server();

    let response = server
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();

    let schema = &response.resource_schemas["notes_note"];
    let attributes = &schema.block.as_ref().unwrap().attributes;
    let revision = attributes.iter().find(|a| a.name == "revision").unwrap();
    assert_eq!(revision.r#type, b"\"number\"".to_vec());
    assert!(revision.computed);
}

#[tokio::test]
async fn validate_reports_attribute_scoped_errors() {
    let (server, _) = server();

    let response = server
        .validate_resource_config(Request::new(proto::validate_resource_config::Request {
            type_name: "notes_note".to_string(),
            config: encode(&note(&[("text", "".into())])),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert!(response.diagnostics[0].attribute.is_some());
}

#[tokio::test]
async fn create_plan_marks_computed_attributes_unknown() {
    let (server, _) = server();
    let proposed = note(&[("text", "hello".into())]);

    let response = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "notes_note".to_string(),
            prior_state: encode(&DynamicValue::null()),
            proposed_new_state: encode(&proposed),
            config: encode(&proposed),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    let planned = decode(response.planned_state);
    assert!(planned.get(&AttributePath::new("id")).unwrap().is_unknown());
    assert!(planned.get(&AttributePath::new("revision")).unwrap().is_unknown());
    assert!(response.requires_replace.is_empty());
}

#[tokio::test]
async fn update_plan_keeps_id_and_flags_replacement() {
    let (server, _) = server();
    let prior = note(&[
        ("id", "n-1".into()),
        ("text", "hello".into()),
        ("folder", "work".into()),
        ("revision", Dynamic::Number(1.0)),
    ]);
    let config = note(&[("text", "hello".into()), ("folder", "home".into())]);
    let proposed = note(&[
        ("id", "n-1".into()),
        ("text", "hello".into()),
        ("folder", "home".into()),
        ("revision", Dynamic::Number(1.0)),
    ]);

    let response = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "notes_note".to_string(),
            prior_state: encode(&prior),
            proposed_new_state: encode(&proposed),
            config: encode(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    let planned = decode(response.planned_state);
    assert_eq!(planned.get_string(&AttributePath::new("id")).unwrap(), "n-1");
    assert!(planned.get(&AttributePath::new("revision")).unwrap().is_unknown());
    assert_eq!(response.requires_replace.len(), 1);
}

#[tokio::test]
async fn apply_routes_create_and_delete() {
    let (server, store) = server();
    configure(&server).await;

    let mut planned = note(&[("text", "hello".into())]);
    planned.mark_unknown(&AttributePath::new("id")).unwrap();
    planned.mark_unknown(&AttributePath::new("revision")).unwrap();

    let created = server
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "notes_note".to_string(),
            prior_state: encode(&DynamicValue::null()),
            planned_state: encode(&planned),
            config: encode(&note(&[("text", "hello".into())])),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(created.diagnostics.is_empty());
    let state = decode(created.new_state);
    assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "n-1");
    assert_eq!(store.lock().unwrap().get("n-1").unwrap(), "hello");

    let deleted = server
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "notes_note".to_string(),
            prior_state: encode(&state),
            planned_state: encode(&DynamicValue::null()),
            config: encode(&DynamicValue::null()),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(decode(deleted.new_state).is_null());
    assert!(store.lock().unwrap().is_empty());
}

#[tokio::test]
async fn read_of_missing_resource_returns_null_state() {
    let (server, _) = server();
    configure(&server).await;

    let response = server
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "notes_note".to_string(),
            current_state: encode(&note(&[("id", "gone".into()), ("text", "x".into())])),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty());
    assert!(decode(response.new_state).is_null());
}

#[tokio::test]
async fn import_without_support_reports_error() {
    let (server, _) = server();
    configure(&server).await;

    let response = server
        .import_resource_state(Request::new(proto::import_resource_state::Request {
            type_name: "notes_note".to_string(),
            id: "n-1".to_string(),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.imported_resources.is_empty());
    assert_eq!(response.diagnostics.len(), 1);
}

#[tokio::test]
async fn upgrade_state_passes_json_through() {
    let (server, _) = server();

    let response = server
        .upgrade_resource_state(Request::new(proto::upgrade_resource_state::Request {
            type_name: "notes_note".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: br#"{"id":"n-1","text":"hello","folder":null,"revision":3}"#.to_vec(),
                flatmap: HashMap::new(),
            }),
        }))
        .await
        .unwrap()
        .into_inner();

    let upgraded = decode(response.upgraded_state);
    assert_eq!(upgraded.get_number(&AttributePath::new("revision")).unwrap(), 3.0);
}

#[tokio::test]
async fn stop_provider_cancels_root_context() {
    let (server, _) = server();
    let ctx = server.context();

    server
        .stop_provider(Request::new(proto::stop_provider::Request {}))
        .await
        .unwrap();

    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn concurrent_plans_share_cached_schema() {
    let (server, _) = server();
    let server = Arc::new(server);
    let proposed = note(&[("text", "hello".into())]);

    let plans = (0..8).map(|_| {
        let server = server.clone();
        let proposed = proposed.clone();
        async move {
            server
                .plan_resource_change(Request::new(proto::plan_resource_change::Request {
                    type_name: "notes_note".to_string(),
                    prior_state: encode(&DynamicValue::null()),
                    proposed_new_state: encode(&proposed),
                    config: encode(&proposed),
                    ..Default::default()
                }))
                .await
        }
    });

    for result in futures::future::join_all(plans).await {
        let planned = decode(result.unwrap().into_inner().planned_state);
        assert!(planned.get(&AttributePath::new("id")).unwrap().is_unknown());
    }
}

#[test]
fn unknown_resource_type_is_a_diagnostic() {
    let (server, _) = server();

    let response = tokio_test::block_on(server.validate_resource_config(Request::new(
        proto::validate_resource_config::Request {
            type_name: "notes_missing".to_string(),
            config: encode(&DynamicValue::object()),
            client_capabilities: None,
        },
    )))
    .unwrap()
    .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        response.diagnostics[0].severity,
        proto::diagnostic::Severity::Error as i32
    );
}
