pub mod error;
pub mod invalidate;
pub mod links;
pub mod memory;
pub mod service;
pub mod store;

pub use error::{StoreError, ThreadError};
pub use invalidate::{InvalidationSink, NoopInvalidator, RecordingInvalidator};
pub use memory::MemoryStore;
pub use service::{CreateComment, CreateThread, PageRequest, ThreadService, ThreadServiceConfig};
pub use store::Store;
