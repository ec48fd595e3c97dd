//! DeliveryTransport trait definition.
//!
//! Outbound message channel used by both the scheduler (job execution) and
//! the reply loop (generated replies, image side effects). Implementations
//! live in chime-infra (e.g., `TelegramTransport`).

use chime_types::error::DeliveryError;

/// Where a piece of media lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A path on local disk (stored uploads).
    Path(String),
    /// A remote URL (e.g., a freshly generated image).
    Url(String),
}

/// Transport for outbound messages and media.
pub trait DeliveryTransport: Send + Sync {
    /// Send plain text to a delivery target.
    fn send_text(
        &self,
        target: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;

    /// Send a photo to a delivery target.
    fn send_photo(
        &self,
        target: &str,
        source: &MediaSource,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;

    /// Send a video to a delivery target.
    fn send_video(
        &self,
        target: &str,
        source: &MediaSource,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;
}
