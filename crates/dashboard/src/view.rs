use std::sync::Arc;

use schemagen::SourceGenerator;
use shared::domain::NamespaceDefinition;
use storage::Datastore;
use thiserror::Error;
use tracing::warn;

/// Namespaces whose joint presence marks the onboarding demo schema.
const SAMPLE_NAMESPACES: [&str; 2] = ["user", "resource"];

/// Everything the page template needs for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub is_ready: bool,
    pub is_empty: bool,
    pub schema_text: String,
    pub has_sample_schema: bool,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("datastore readiness check failed")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("failed to list namespace definitions")]
    StoreQueryFailed(#[source] anyhow::Error),
}

/// Turns the current datastore state into a [`ViewModel`]. Holds no state
/// of its own, so one instance serves any number of concurrent requests.
#[derive(Clone)]
pub struct ViewResolver {
    datastore: Arc<dyn Datastore>,
    generator: Arc<dyn SourceGenerator>,
}

impl ViewResolver {
    pub fn new(datastore: Arc<dyn Datastore>, generator: Arc<dyn SourceGenerator>) -> Self {
        Self {
            datastore,
            generator,
        }
    }

    pub async fn resolve(&self) -> Result<ViewModel, ResolveError> {
        let is_ready = self
            .datastore
            .is_ready()
            .await
            .map_err(ResolveError::StoreUnavailable)?;
        if !is_ready {
            return Ok(ViewModel::default());
        }

        let namespaces = self
            .datastore
            .list_namespaces()
            .await
            .map_err(ResolveError::StoreQueryFailed)?;

        let schema_text = namespaces
            .iter()
            .map(|definition| self.source_or_empty(definition))
            .filter(|source| !source.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let has_sample_schema = !schema_text.is_empty() && contains_sample_schema(&namespaces);

        Ok(ViewModel {
            is_ready,
            is_empty: schema_text.is_empty(),
            schema_text,
            has_sample_schema,
        })
    }

    fn source_or_empty(&self, definition: &NamespaceDefinition) -> String {
        match self.generator.generate_source(definition) {
            Ok(source) => source,
            Err(error) => {
                warn!(
                    namespace = %definition.name,
                    %error,
                    "failed to generate schema source; leaving it out of the page"
                );
                String::new()
            }
        }
    }
}

/// Exact, case-sensitive name match; order and extra namespaces are irrelevant.
pub fn contains_sample_schema(namespaces: &[NamespaceDefinition]) -> bool {
    SAMPLE_NAMESPACES
        .iter()
        .all(|wanted| namespaces.iter().any(|definition| definition.name == *wanted))
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
