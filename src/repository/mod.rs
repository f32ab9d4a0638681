pub mod cache;

pub use cache::{CacheWarning, MappingCache};
