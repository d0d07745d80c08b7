use lorekeep_core::{MessageReader, MessageWriter, PersistenceError};
use tokio_util::sync::CancellationToken;

/// Copies a session's messages page by page, returning how many were read.
///
/// Each read asks for one message past the page, so a full final page is
/// recognised without a trailing empty read. With no writer the pages are
/// only counted. The token is checked before every fetch, never mid-write.
pub(crate) async fn transfer_messages(
    reader: &dyn MessageReader,
    writer: Option<&dyn MessageWriter>,
    session_id: &str,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<usize, PersistenceError> {
    let page_size = page_size.max(1);
    let mut offset = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }

        let fetched = reader
            .list_page(session_id, offset, page_size.saturating_add(1))
            .await?;
        let more = fetched.len() > page_size;
        let page = &fetched[..fetched.len().min(page_size)];
        if page.is_empty() {
            break;
        }
        if let Some(writer) = writer {
            writer.batch_create(page).await?;
        }

        offset += page.len();
        if !more {
            break;
        }
    }
    Ok(offset)
}
