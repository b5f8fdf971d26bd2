//! Domain entity extraction

use async_trait::async_trait;

use crate::{EntitySlots, Result};

/// Domain entity extractor
///
/// Opaque to the loop, which only reads category presence and counts.
#[async_trait]
pub trait EntityExtractor: Send + Sync + 'static {
    async fn extract(&self, text: &str) -> Result<EntitySlots>;
}
