use std::sync::Arc;

use sheets::{CellRange, SheetsConnector, SheetsError, SpreadsheetSession, WorksheetRef};
use shared::{
    domain::Story,
    protocol::{ServerNotice, TransferRequest},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use tracker::{TrackerClient, TrackerError};

/// Data rows start below the header row.
const FIRST_DATA_ROW: u32 = 2;
/// Clearing covers the first six columns of each row.
const CLEAR_COL_SPAN: u32 = 6;
const NAME_COL: u32 = 1;
const URL_COL: u32 = 5;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Tracker fetch failed: {0}")]
    TrackerFetch(#[source] TrackerError),
    #[error("Spreadsheet authentication failed: {0}")]
    SpreadsheetAuth(#[source] SheetsError),
    #[error("{index} is not a valid worksheet number")]
    InvalidWorksheetIndex { index: u32 },
    #[error("Sheet update failed: {0}")]
    SheetIo(#[source] SheetsError),
}

/// Collaborators for one transfer. Cloning is cheap; the resolved
/// session and worksheet travel through the pipeline as locals, never
/// as shared state.
#[derive(Clone)]
pub struct TransferContext {
    pub tracker: Arc<dyn TrackerClient>,
    pub sheets: Arc<dyn SheetsConnector>,
}

/// Runs the five transfer steps strictly in order: fetch stories,
/// authenticate, resolve the worksheet, clear prior rows, write names
/// then URLs. The first failing step aborts the rest; nothing is
/// retried. Progress notices go to `notices` in emission order.
pub async fn run_transfer(
    ctx: &TransferContext,
    request: &TransferRequest,
    notices: &mpsc::UnboundedSender<ServerNotice>,
) -> Result<(), TransferError> {
    let stories = ctx
        .tracker
        .fetch_finished_stories(&request.project_id, &request.tracker_token)
        .await
        .map_err(TransferError::TrackerFetch)?;
    info!(
        project_id = %request.project_id,
        stories = stories.len(),
        "fetched finished stories"
    );

    let session = ctx
        .sheets
        .open(&request.spreadsheet_key)
        .await
        .map_err(TransferError::SpreadsheetAuth)?;
    session
        .authenticate(&request.credentials)
        .await
        .map_err(TransferError::SpreadsheetAuth)?;

    let document = session.get_info().await.map_err(TransferError::SheetIo)?;
    let worksheet = document
        .worksheets
        .get((request.worksheet_number - 1) as usize)
        .cloned()
        .ok_or(TransferError::InvalidWorksheetIndex {
            index: request.worksheet_number,
        })?;
    let _ = notices.send(ServerNotice::PortingTo {
        spreadsheet_title: document.title.clone(),
        worksheet_title: worksheet.title.clone(),
    });

    clear_prior_rows(session.as_ref(), &worksheet, request.clear_through_row).await?;

    let _ = notices.send(ServerNotice::PortingStories);
    write_column(session.as_ref(), &worksheet, NAME_COL, &stories, |story| {
        &story.name
    })
    .await?;
    write_column(session.as_ref(), &worksheet, URL_COL, &stories, |story| {
        &story.url
    })
    .await?;

    info!(worksheet = %worksheet.title, stories = stories.len(), "transfer completed");
    Ok(())
}

/// Blanks the first `(clear_through_row - 1) * 6` cells of the
/// row-major range below the header and writes the range back in one
/// update. A clear row of 1 blanks nothing; the write still runs.
async fn clear_prior_rows(
    session: &dyn SpreadsheetSession,
    worksheet: &WorksheetRef,
    clear_through_row: u32,
) -> Result<(), TransferError> {
    let range = CellRange {
        min_row: FIRST_DATA_ROW,
        max_row: None,
        min_col: 1,
        max_col: CLEAR_COL_SPAN,
        include_empty: true,
    };
    let mut cells = session
        .get_cells(worksheet, &range)
        .await
        .map_err(TransferError::SheetIo)?;

    let blank_count = ((clear_through_row - 1) * CLEAR_COL_SPAN) as usize;
    for cell in cells.iter_mut().take(blank_count) {
        cell.value.clear();
    }

    session
        .bulk_update(worksheet, &cells)
        .await
        .map_err(TransferError::SheetIo)
}

/// Reads one column below the header, overwrites cell i with the
/// i-th story's field, and writes the column back in one update.
async fn write_column<F>(
    session: &dyn SpreadsheetSession,
    worksheet: &WorksheetRef,
    col: u32,
    stories: &[Story],
    field: F,
) -> Result<(), TransferError>
where
    F: Fn(&Story) -> &str,
{
    let range = CellRange {
        min_row: FIRST_DATA_ROW,
        max_row: None,
        min_col: col,
        max_col: col,
        include_empty: true,
    };
    let mut cells = session
        .get_cells(worksheet, &range)
        .await
        .map_err(TransferError::SheetIo)?;

    for (cell, story) in cells.iter_mut().zip(stories) {
        cell.value = field(story).to_string();
    }

    session
        .bulk_update(worksheet, &cells)
        .await
        .map_err(TransferError::SheetIo)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
