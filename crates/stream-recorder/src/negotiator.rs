//! Offer handling for producers that expose a pullable MJPEG stream.

use stream_recorder_core::{MjpegSource, Negotiated, Negotiator, SessionDescription, SourceError};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;
use tracing::{info, instrument};

/// Treats the offer body as the locator of an MJPEG stream (URL or file)
/// and connects to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullNegotiator;

#[async_trait]
impl Negotiator for PullNegotiator {
    #[instrument(skip(self, offer), fields(kind = %offer.kind))]
    async fn negotiate(&self, offer: SessionDescription) -> Result<Negotiated, SourceError> {
        let rejected = |reason: &str| SourceError::Negotiation {
            reason: reason.to_string(),
            location: ErrorLocation::from(Location::caller()),
        };

        if !offer.kind.eq_ignore_ascii_case("offer") {
            return Err(rejected("Expected a session description of type 'offer'"));
        }

        let locator = offer.sdp.trim();
        if locator.is_empty() {
            return Err(rejected("Offer carries no source locator"));
        }

        let source = MjpegSource::open(locator).await?;

        info!(locator, "Offer accepted");

        Ok(Negotiated {
            answer: SessionDescription::answer(locator),
            source: Box::new(source),
        })
    }
}
