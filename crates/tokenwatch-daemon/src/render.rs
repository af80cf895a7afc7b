use tokenwatch_panel::PanelSnapshot;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Write the latest render seen on `renders` to `out`, separated by a blank
/// line.
///
/// Renders that land while a write is in flight are merged, so only the most
/// recent of them is written. Returns when the panel is dropped.
pub async fn render_to<W>(
    mut renders: watch::Receiver<PanelSnapshot>,
    mut out: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while renders.changed().await.is_ok() {
        let text = format!("{}\n\n", *renders.borrow_and_update());
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
