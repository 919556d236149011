//! Common types for ember: resource graph, tokens, IAM model, errors and
//! template rendering

#![deny(missing_docs)]

pub mod context;
pub mod error;
pub mod graph;
pub mod iam;
pub mod id;
pub mod parameters;
pub mod resource;
pub mod template;
pub mod token;

pub use error::Error;
pub use graph::{ResourceGraph, Scope, TemplateOutput, TemplateParameter};
pub use id::LogicalId;
pub use resource::Resource;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Description written into every rendered template
pub const TEMPLATE_DESCRIPTION: &str = "Spark on EMR-on-EKS: network, cluster, studio and managed endpoint";

/// Group name of the network declaration
pub const NETWORK_GROUP: &str = "Network";

/// Group name of the compute declaration
pub const COMPUTE_GROUP: &str = "Compute";

/// Group name of the studio declaration
pub const STUDIO_GROUP: &str = "Studio";

/// Group name of the endpoint declaration
pub const ENDPOINT_GROUP: &str = "Endpoint";
