//! Notifier Trait
//!
//! Delivers a plaintext alert to humans. Delivery is best effort: callers log
//! failures and carry on.

use crate::domain::errors::NotifyError;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}
