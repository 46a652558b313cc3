//! The `record` command: pull a stream into rotating segments.

use crate::AppResult;

use stream_recorder_core::{
    BoundaryPolicy, MjpegSource, RecorderError, SessionController, StopOutcome,
};

use tracing::{info, instrument, warn};

/// Records `source` until it ends or Ctrl-C is pressed.
#[instrument(skip(controller, policy))]
pub(crate) async fn record(
    controller: &SessionController,
    source: &str,
    policy: BoundaryPolicy,
) -> AppResult<StopOutcome> {
    let source = MjpegSource::open(source)
        .await
        .map_err(RecorderError::from)?;
    let session_id = controller.start_source(Box::new(source), policy).await?;

    info!(%session_id, "Recording, press Ctrl-C to stop");

    let outcome = tokio::select! {
        outcome = controller.closed(session_id) => outcome?,
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(e) = interrupted {
                warn!(error = ?e, "Ctrl-C listener failed, stopping");
            }
            controller.stop(Some(session_id)).await
        }
    };

    Ok(outcome)
}
