//! Stage handler implementations.

pub mod fetch;
pub mod publish;
pub mod transform;

pub use fetch::FetchStage;
pub use publish::PublishStage;
pub use transform::TransformStage;
