//! What a resource handle can do
//!
//! Handles are plain structs; each implements only the capabilities its
//! resource supports.

use async_trait::async_trait;
use azmgmt_core::Result;

/// A local definition that becomes a resource when created
#[async_trait]
pub trait Creatable: Send + Sized {
    type Output;

    async fn create(self) -> Result<Self::Output>;
}

/// A handle whose local edits can be pushed to the service
#[async_trait]
pub trait Updatable: Send {
    async fn apply(&mut self) -> Result<()>;
}

/// A handle that can reload its state from the service
#[async_trait]
pub trait Refreshable: Send {
    async fn refresh(&mut self) -> Result<()>;
}
