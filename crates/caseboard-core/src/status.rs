//! Category → status resolution.
//!
//! A case may sit in several workflow categories at once. Resolution keeps every
//! always-shown status, at most one checkuser-pipeline status, and at most one
//! miscellaneous status, which is only shown when nothing more pressing is.

use std::collections::BTreeSet;

use crate::StatusCode;

pub const CATEGORY_NAMESPACE_PREFIX: &str = "Category:";

pub const MORE_INFO_CATEGORY: &str = "SPI cases requesting more information";
pub const PRE_REVIEW_CATEGORY: &str = "SPI cases pending pre-CheckUser review";

pub const CATEGORY_STATUS_TABLE: [(&str, StatusCode); 15] = [
    ("SPI cases currently being checked", StatusCode::InProgress),
    ("SPI cases awaiting a CheckUser", StatusCode::Endorsed),
    ("SPI cases relisted for a checkuser", StatusCode::Relist),
    ("SPI cases requesting a checkuser", StatusCode::CuRequest),
    ("SPI cases needing an Administrator", StatusCode::Admin),
    ("SPI cases needing a Clerk", StatusCode::Clerk),
    ("SPI cases CU complete", StatusCode::Checked),
    ("SPI cases newly filed", StatusCode::New),
    ("SPI cases awaiting review", StatusCode::Open),
    ("SPI cases declined for checkuser by CU", StatusCode::CuDeclined),
    ("SPI cases declined for checkuser by clerk", StatusCode::Declined),
    (MORE_INFO_CATEGORY, StatusCode::MoreInfo),
    ("SPI cases on hold by checkuser", StatusCode::CuHold),
    ("SPI cases on hold by clerk", StatusCode::Hold),
    ("SPI cases awaiting archive", StatusCode::Close),
];

/// Statuses that are always displayed, in display order.
pub const ALWAYS_SHOWN: [StatusCode; 4] =
    [StatusCode::Admin, StatusCode::Clerk, StatusCode::Checked, StatusCode::Close];

/// Mutually exclusive checkuser pipeline, highest priority first.
pub const PIPELINE_PRIORITY: [StatusCode; 4] =
    [StatusCode::InProgress, StatusCode::Relist, StatusCode::Endorsed, StatusCode::CuRequest];

/// Mutually exclusive miscellaneous statuses, highest priority first.
pub const MISC_PRIORITY: [StatusCode; 8] = [
    StatusCode::New,
    StatusCode::Open,
    StatusCode::CuDeclined,
    StatusCode::Declined,
    StatusCode::CuMoreInfo,
    StatusCode::MoreInfo,
    StatusCode::CuHold,
    StatusCode::Hold,
];

fn strip_namespace(category: &str) -> &str {
    category.strip_prefix(CATEGORY_NAMESPACE_PREFIX).unwrap_or(category).trim()
}

/// Look up one category title. `pre_review_pending` enables the compound more-info rule.
#[must_use]
pub fn status_for_category(category: &str, pre_review_pending: bool) -> Option<StatusCode> {
    let title = strip_namespace(category);
    if pre_review_pending && title == MORE_INFO_CATEGORY {
        return Some(StatusCode::CuMoreInfo);
    }

    CATEGORY_STATUS_TABLE.iter().find(|(name, _)| *name == title).map(|(_, status)| *status)
}

fn highest_priority(priority: &[StatusCode], present: &BTreeSet<StatusCode>) -> Option<StatusCode> {
    priority.iter().copied().find(|status| present.contains(status))
}

/// Resolve a case's categories into its ordered display statuses.
///
/// An empty result means no category was recognized; callers drop the case.
/// At most five statuses come back: the four always-shown ones plus one pipeline status.
#[must_use]
pub fn resolve_statuses<I, S>(categories: I) -> Vec<StatusCode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let titles = categories.into_iter().collect::<Vec<_>>();
    let pre_review_pending =
        titles.iter().any(|category| strip_namespace(category.as_ref()) == PRE_REVIEW_CATEGORY);

    let present = titles
        .iter()
        .filter_map(|category| status_for_category(category.as_ref(), pre_review_pending))
        .collect::<BTreeSet<_>>();

    let mut result =
        ALWAYS_SHOWN.iter().copied().filter(|status| present.contains(status)).collect::<Vec<_>>();

    if let Some(pipeline) = highest_priority(&PIPELINE_PRIORITY, &present) {
        result.push(pipeline);
    }

    // Checked against the combined always-shown + pipeline result.
    if result.is_empty() || result == [StatusCode::Close] {
        if let Some(misc) = highest_priority(&MISC_PRIORITY, &present) {
            result.push(misc);
        }
    }

    result
}
