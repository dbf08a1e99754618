use std::collections::BTreeMap;

use crate::attribution::find_last_attendant;
use crate::status::resolve_statuses;
use crate::timestamp::TimestampExtractor;
use crate::{format_edit_time, BoardError, CaseRecord, CaseSnapshot, PrivilegedSet, StatusCode};

/// Rewrites selected usernames to a preferred spelling; matching ignores case.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NameNormalizer {
    overrides: BTreeMap<String, String>,
}

impl NameNormalizer {
    #[must_use]
    pub fn new(overrides: &BTreeMap<String, String>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(from, to)| (from.to_lowercase(), to.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn normalize(&self, username: &str) -> String {
        self.overrides
            .get(&username.to_lowercase())
            .cloned()
            .unwrap_or_else(|| username.to_string())
    }
}

/// Composes one case snapshot into its board rows.
#[derive(Debug, Clone, Copy)]
pub struct CaseRecordBuilder<'a> {
    privileged: &'a PrivilegedSet,
    names: &'a NameNormalizer,
    timestamps: &'a TimestampExtractor,
}

impl<'a> CaseRecordBuilder<'a> {
    #[must_use]
    pub fn new(
        privileged: &'a PrivilegedSet,
        names: &'a NameNormalizer,
        timestamps: &'a TimestampExtractor,
    ) -> Self {
        Self { privileged, names, timestamps }
    }

    /// Build one record per resolved status of `case`.
    ///
    /// An empty vector means the case carries no recognized status (typically it
    /// was archived while the snapshot was being taken) and should be left off the board.
    ///
    /// # Errors
    /// Returns [`BoardError::Validation`] when the case title has no case name
    /// segment or the case has no edit history.
    pub fn build(&self, case: &CaseSnapshot) -> Result<Vec<CaseRecord>, BoardError> {
        let statuses = resolve_statuses(&case.categories);
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let case_name = case.case_name()?;
        let Some(newest) = case.edits.first() else {
            return Err(BoardError::Validation(format!(
                "case `{case_name}` has no edit history"
            )));
        };

        let (last_attendant, last_attendant_time) =
            match find_last_attendant(&case.edits, self.privileged) {
                Some(attendant) => {
                    (self.names.normalize(&attendant.name), format_edit_time(attendant.at))
                }
                None => (String::new(), String::new()),
            };

        let template = CaseRecord {
            case_name: case_name.to_string(),
            status: statuses[0],
            filing_time: self.timestamps.filing_time(case.text.lines()),
            last_editor: self.names.normalize(&newest.author),
            last_editor_time: format_edit_time(newest.timestamp),
            last_attendant,
            last_attendant_time,
        };

        Ok(fan_out(&template, &statuses))
    }
}

/// One copy of `template` per status, in resolution order.
#[must_use]
pub fn fan_out(template: &CaseRecord, statuses: &[StatusCode]) -> Vec<CaseRecord> {
    statuses.iter().map(|status| CaseRecord { status: *status, ..template.clone() }).collect()
}
