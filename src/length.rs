//! Book length discovery.

use tracing::debug;

use crate::assembler::probe_page;
use crate::error::FetchError;
use crate::request::PageId;
use crate::session::BookSession;
use crate::source::ImageSource;

const INITIAL_CURSOR: u32 = 100;
const INITIAL_STEP: u32 = 100;

/// Finds the last page number that resolves.
///
/// Walks forward from page 100 in steps of 100; every miss backs up one step
/// and divides the step by ten. A miss at step 1 marks the boundary. Returns
/// 0 when not even page 1 resolves. Only auth faults surface as errors.
pub async fn find_length<S: ImageSource>(
    session: &mut BookSession<S>,
) -> Result<u32, FetchError> {
    let mut cursor = INITIAL_CURSOR;
    let mut step = INITIAL_STEP;

    loop {
        let found = probe_page(session, PageId::Number(cursor)).await?;
        debug!(page = cursor, step, found, "Length probe");

        if found {
            cursor += step;
            continue;
        }
        if step == 1 {
            return Ok(cursor - 1);
        }
        cursor -= step;
        step = (step / 10).max(1);
        cursor += step;
    }
}
