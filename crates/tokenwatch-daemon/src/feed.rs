use tokenwatch_event::{EventBus, RefreshStatus};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Parse one line of the refresh-status feed. Blank lines yield `None`.
pub fn parse_status_line(line: &str) -> Option<Result<RefreshStatus, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Publish every well-formed `RefreshStatus` line from `reader` on `bus`.
///
/// Returns once the reader reaches end of input. Malformed lines are logged
/// and skipped.
pub async fn pump_statuses<R>(reader: R, bus: EventBus) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_status_line(&line) {
            None => continue,
            Some(Ok(status)) => {
                let receivers = bus.publish_refresh_status(status);
                debug!(receivers, "refresh status published");
                published += 1;
            }
            Some(Err(error)) => warn!(%error, %line, "skipping malformed refresh status"),
        }
    }
    info!(published, "refresh status feed closed");
    Ok(published)
}
