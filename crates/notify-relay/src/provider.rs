use async_trait::async_trait;
use std::path::Path;

use crate::types::{ChannelId, ProviderResponse, TextFormat};

/// External delivery service
///
/// Implementations never fail with an error; every outcome, including
/// transport failures, is expressed as a [`ProviderResponse`].
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn send_text(&self, channel: &ChannelId, text: &str, format: TextFormat)
        -> ProviderResponse;

    async fn send_file(
        &self,
        channel: &ChannelId,
        path: &Path,
        caption: Option<&str>,
        format: TextFormat,
    ) -> ProviderResponse;
}
