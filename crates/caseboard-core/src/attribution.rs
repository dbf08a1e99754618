use time::OffsetDateTime;

use crate::{Edit, PrivilegedSet};

/// Summary fragments (lowercase) marking the start of a new episode: archival or a case move.
pub const EPISODE_BOUNDARY_MARKERS: [&str; 3] = ["archiv", "moving", "moved"];

/// The privileged reviewer credited with the latest action in the current episode.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Attendant {
    pub name: String,
    pub at: OffsetDateTime,
}

impl Attendant {
    fn from_edit(edit: &Edit) -> Self {
        Self { name: edit.author.clone(), at: edit.timestamp }
    }
}

#[must_use]
pub fn is_episode_boundary(summary: &str) -> bool {
    let summary = summary.to_lowercase();
    EPISODE_BOUNDARY_MARKERS.iter().any(|marker| summary.contains(marker))
}

/// Scan edits (newest first) for the last privileged editor of the current episode.
///
/// The newest edit is only checked for a privileged author; its summary never
/// ends the episode. Each older edit is tested for an episode boundary before its
/// author is considered, and the first boundary ends the scan with no attendant.
#[must_use]
pub fn find_last_attendant(edits: &[Edit], privileged: &PrivilegedSet) -> Option<Attendant> {
    let (newest, older) = edits.split_first()?;
    if privileged.contains(&newest.author) {
        return Some(Attendant::from_edit(newest));
    }

    for edit in older {
        if is_episode_boundary(&edit.summary) {
            return None;
        }

        if privileged.contains(&edit.author) {
            return Some(Attendant::from_edit(edit));
        }
    }

    None
}
