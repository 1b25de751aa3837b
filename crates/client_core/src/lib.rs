pub mod backend;
pub mod controller;
pub mod local;
pub mod remote;

pub use backend::{BackendKind, BackendSet, StoreBackend, StoreEvent, Subscription};
pub use controller::{ListController, ListError, ListEvent, SyncStatus};
pub use local::LocalBackend;
pub use remote::RemoteBackend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
