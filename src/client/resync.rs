//! Recovery after the server refuses an answer with `conflict`.
//!
//! A conflict does not say whether the answer is stored. An earlier attempt
//! may have landed, another client may have moved the session on, or the
//! session may have been replaced by a new one. The ledger decides.

use tracing::{info, warn};

use super::api::InterviewClient;
use super::driver::PresentationDriver;
use crate::error::ClientError;

/// How a conflicting answer submission was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The answer is the last ledger entry; the transcript stands.
    Stored,
    /// The answer is not stored. The driver was remounted from the server
    /// and the visitor has to reply to whatever it now shows.
    Withdrawn,
}

/// Settle a pending answer after a `conflict` response.
///
/// On error the pending submission is withdrawn and the driver is left
/// otherwise untouched.
pub async fn resolve_answer_conflict(
    client: &InterviewClient,
    driver: &mut PresentationDriver,
    question: &str,
    answer: &str,
) -> Result<Resolution, ClientError> {
    let fetched = async {
        let point = client.which_question().await?;
        let ledger = client.answer_list().await?;
        Ok::<_, ClientError>((point, ledger))
    }
    .await;
    let (point, ledger) = match fetched {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(error = %e, "Could not resync after a conflicting answer");
            driver.submission_failed();
            return Err(e);
        }
    };

    let stored = ledger
        .last()
        .is_some_and(|entry| entry.question == question && entry.answer == answer);
    if stored {
        info!(progress = point.question_index, "Conflicting answer was already stored");
        driver.answer_recorded(point.question_index);
        return Ok(Resolution::Stored);
    }

    info!(
        progress = point.question_index,
        state = %point.state,
        "Conflicting answer not stored, resyncing"
    );
    driver.submission_failed();
    driver.mount(&point, &ledger);
    Ok(Resolution::Withdrawn)
}
