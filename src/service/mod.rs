pub mod follower;
pub mod pipeline;
pub mod reporter;
pub mod resolver;

pub use follower::{FollowExecutor, FollowHandle, FollowRequest};
pub use pipeline::MappingPipeline;
pub use reporter::ProgressReporter;
pub use resolver::IdentityResolver;
