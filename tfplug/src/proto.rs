//! Protocol buffer types for Terraform plugin protocol v6
//!
//! Generated at build time by tonic_build from `proto/tfplugin6.proto`.
//!
//! - RPC request/response types live in snake_case modules
//!   (e.g. `get_provider_schema::Request`, `read_resource::Response`)
//! - Nested messages and enums live in sub-modules (e.g. `diagnostic::Severity`)
//! - The service trait is `provider_server::Provider`
//!
//! Several generated types share names with framework types (`DynamicValue`,
//! `Diagnostic`, `Schema`); always refer to these through the `proto::` prefix.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_types_accessible() {
        let _ = diagnostic::Severity::Warning;
        let _ = attribute_path::step::Selector::AttributeName("test".to_string());
        let _ = schema::object::NestingMode::List;
        let _ = get_provider_schema::Response::default();
        let _ = stop_provider::Response::default();
    }
}
