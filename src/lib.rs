//! Search-style query → rsearch translation service → parameterized SQLite execution.
//!
//! ```rust,ignore
//! use rsearch_client::{Config, SearchPipeline, SearchRequest, TableTemplate};
//!
//! let pipeline = SearchPipeline::from_config(&config)?;
//! let template = TableTemplate::select_all("products")?;
//! let records = pipeline
//!     .run(&SearchRequest {
//!         schema: "products",
//!         database: "sqlite",
//!         template: &template,
//!         query: "productCode:13w42 AND region:ca",
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod translate;

pub use config::{Config, StoreConfig, TranslationConfig};
pub use pipeline::{Origin, PipelineError, SearchPipeline, SearchRequest};
pub use record::{ResultRecord, Value};
pub use store::{Execute, ExecutionError, QueryExecutor, TableTemplate, TemplateError};
pub use translate::{Predicate, Translate, TranslationClient, TranslationError};

pub const USER_AGENT: &str = concat!("rsearch-client/", env!("CARGO_PKG_VERSION"));
