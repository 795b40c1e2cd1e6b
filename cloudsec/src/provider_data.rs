//! Provider data structure passed to resources and data sources

use crate::api::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfplug::Diagnostic;

#[derive(Clone)]
pub struct CloudSecProviderData {
    pub client: Arc<Client>,
    pub crash_stack_dir: Option<PathBuf>,
}

impl CloudSecProviderData {
    pub fn new(client: Client, crash_stack_dir: Option<PathBuf>) -> Self {
        Self {
            client: Arc::new(client),
            crash_stack_dir,
        }
    }

    pub fn crash_dir(&self) -> Option<&Path> {
        self.crash_stack_dir.as_deref()
    }

    /// Extract provider data handed to a resource or data source `configure` call
    pub fn from_configure(
        provider_data: Option<std::sync::Arc<dyn std::any::Any + Send + Sync>>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Self> {
        match provider_data {
            Some(data) => match data.downcast_ref::<CloudSecProviderData>() {
                Some(provider_data) => Some(provider_data.clone()),
                None => {
                    diagnostics.push(Diagnostic::error(
                        "Invalid provider data",
                        "Failed to extract CloudSecProviderData from provider data",
                    ));
                    None
                }
            },
            None => {
                diagnostics.push(Diagnostic::error(
                    "Provider not configured",
                    "The provider must be configured before resources can be managed",
                ));
                None
            }
        }
    }
}
