pub mod memory;
pub mod realtime;
pub mod rest;
pub mod storage;

pub use memory::MemoryStore;
pub use realtime::RealtimeClient;
pub use rest::RestStore;
pub use storage::ObjectStorage;
