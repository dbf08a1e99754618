use std::cmp::Ordering;

use crate::{CaseRecord, StatusCode};

/// Presentation order of statuses; a status's rank is its index here.
pub const DISPLAY_ORDER: [StatusCode; 17] = [
    StatusCode::InProgress,
    StatusCode::Endorsed,
    StatusCode::Relist,
    StatusCode::Quick,
    StatusCode::CuRequest,
    StatusCode::Admin,
    StatusCode::Clerk,
    StatusCode::Checked,
    StatusCode::New,
    StatusCode::Open,
    StatusCode::CuDeclined,
    StatusCode::Declined,
    StatusCode::CuMoreInfo,
    StatusCode::MoreInfo,
    StatusCode::CuHold,
    StatusCode::Hold,
    StatusCode::Close,
];

pub const RANKING_RULESET_VERSION: &str = "ranking.v1";

#[must_use]
pub fn display_rank(status: StatusCode) -> usize {
    DISPLAY_ORDER.iter().position(|candidate| *candidate == status).unwrap_or(DISPLAY_ORDER.len())
}

#[must_use]
pub fn default_ranking_tie_breakers() -> Vec<String> {
    vec![
        "status_rank asc".to_string(),
        "filing_time asc (string order)".to_string(),
        "input order (stable)".to_string(),
    ]
}

fn compare(lhs: &CaseRecord, rhs: &CaseRecord) -> Ordering {
    display_rank(lhs.status)
        .cmp(&display_rank(rhs.status))
        .then_with(|| lhs.filing_time.cmp(&rhs.filing_time))
}

/// Order the complete record collection for presentation.
///
/// `sort_by` is stable, so rows with equal keys (including the fan-out of one
/// case) keep their input order.
#[must_use]
pub fn rank_records(mut records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    records.sort_by(compare);
    records
}
