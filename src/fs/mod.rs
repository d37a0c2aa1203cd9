pub mod backend;
pub mod local;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod s3;
pub mod types;

pub use backend::{ObjectStore, S3Provider};
pub use local::LocalFs;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use s3::S3Store;
pub use types::*;
