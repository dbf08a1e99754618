use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ranking::{default_ranking_tie_breakers, rank_records, RANKING_RULESET_VERSION};
use crate::record::CaseRecordBuilder;
use crate::{CaseRecord, CaseSnapshot, StatusCode};

pub const NO_STATUS_REASON: &str = "no recognized status category (case may have been archived)";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SkipSource {
    Case,
    QuickRequest,
}

/// A case or quick request left off the board, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SkippedCase {
    pub title: String,
    pub source: SkipSource,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RankingMetadata {
    pub ruleset_version: String,
    pub tie_breakers: Vec<String>,
}

/// The fully ordered status board for one run.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Board {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub cases_seen: usize,
    pub determinism: RankingMetadata,
    pub rows: Vec<CaseRecord>,
    pub skipped: Vec<SkippedCase>,
}

/// Build every case, append quick requests, and rank the result once.
///
/// Failures are contained per case: a case that errors or resolves to no status
/// is recorded in `skipped` and the rest of the batch proceeds. Quick requests
/// must carry the `QUICK` status and pass [`CaseRecord::validate`].
#[must_use]
pub fn assemble_board(
    cases: &[CaseSnapshot],
    quick_requests: Vec<CaseRecord>,
    builder: &CaseRecordBuilder<'_>,
    generated_at: OffsetDateTime,
) -> Board {
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for case in cases {
        match builder.build(case) {
            Ok(records) if records.is_empty() => skipped.push(SkippedCase {
                title: case.title.clone(),
                source: SkipSource::Case,
                reason: NO_STATUS_REASON.to_string(),
            }),
            Ok(records) => rows.extend(records),
            Err(err) => skipped.push(SkippedCase {
                title: case.title.clone(),
                source: SkipSource::Case,
                reason: err.to_string(),
            }),
        }
    }

    for request in quick_requests {
        let verdict = if request.status == StatusCode::Quick {
            request.validate().map_err(|err| err.to_string())
        } else {
            Err(format!("quick request carries status `{}`, expected QUICK", request.status))
        };

        match verdict {
            Ok(()) => rows.push(request),
            Err(reason) => skipped.push(SkippedCase {
                title: request.case_name,
                source: SkipSource::QuickRequest,
                reason,
            }),
        }
    }

    Board {
        generated_at,
        cases_seen: cases.len(),
        determinism: RankingMetadata {
            ruleset_version: RANKING_RULESET_VERSION.to_string(),
            tie_breakers: default_ranking_tie_breakers(),
        },
        rows: rank_records(rows),
        skipped,
    }
}
