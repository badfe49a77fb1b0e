//! Translate-then-execute composition with origin-tagged failures.
//!
//! Each run is linear: translation must succeed before any store connection is
//! opened, and either the full record set or a single error comes back.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::record::ResultRecord;
use crate::store::{Execute, ExecutionError, QueryExecutor, TableTemplate};
use crate::translate::{Translate, TranslationClient, TranslationError, TranslationRequest};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

/// Which side of the pipeline a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The query or the translation service is at fault.
    Translation,
    /// The query translated fine but the store could not run it.
    Execution,
}

impl PipelineError {
    pub fn origin(&self) -> Origin {
        match self {
            PipelineError::Translation(_) => Origin::Translation,
            PipelineError::Execution(_) => Origin::Execution,
        }
    }

    pub fn is_retriable(&self) -> bool {
        match self {
            PipelineError::Translation(e) => e.is_retriable(),
            PipelineError::Execution(e) => e.is_retriable(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    /// Logical entity the translation service resolves fields against.
    pub schema: &'a str,
    /// Target dialect passed through to the translation service.
    pub database: &'a str,
    pub template: &'a TableTemplate,
    pub query: &'a str,
}

pub struct SearchPipeline<T, E> {
    translator: T,
    executor: E,
}

impl SearchPipeline<TranslationClient, QueryExecutor> {
    pub fn from_config(config: &Config) -> Result<Self, TranslationError> {
        Ok(Self::new(
            TranslationClient::new(&config.translation)?,
            QueryExecutor::new(config.store.clone()),
        ))
    }
}

impl<T: Translate, E: Execute> SearchPipeline<T, E> {
    pub fn new(translator: T, executor: E) -> Self {
        Self {
            translator,
            executor,
        }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn run(&self, request: &SearchRequest<'_>) -> Result<Vec<ResultRecord>, PipelineError> {
        debug!(
            schema = request.schema,
            database = request.database,
            query_len = request.query.len(),
            "translating"
        );

        let translation = TranslationRequest {
            schema: request.schema,
            database: request.database,
            query: request.query,
        };
        let predicate = self
            .translator
            .translate(&translation)
            .await
            .inspect_err(|e| warn!(schema = request.schema, error = %e, "translation failed"))?;

        debug!(params = predicate.parameters.len(), "executing");

        let records = self
            .executor
            .execute(request.template, &predicate)
            .await
            .inspect_err(|e| warn!(schema = request.schema, error = %e, "execution failed"))?;

        info!(schema = request.schema, rows = records.len(), "search complete");
        Ok(records)
    }
}
