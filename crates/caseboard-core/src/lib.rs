use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub mod attribution;
pub mod board;
pub mod ranking;
pub mod record;
pub mod roster;
pub mod status;
pub mod table;
pub mod timestamp;

pub use attribution::{find_last_attendant, Attendant};
pub use board::{assemble_board, Board, RankingMetadata, SkipSource, SkippedCase};
pub use ranking::{default_ranking_tie_breakers, display_rank, rank_records};
pub use record::{CaseRecordBuilder, NameNormalizer};
pub use roster::parse_clerk_roster;
pub use status::resolve_statuses;
pub use table::{edit_summary, render_table, TableTemplate};
pub use timestamp::TimestampExtractor;

/// Sentinel written to `filing_time` when no signature timestamp is found.
pub const UNKNOWN_FILING_TIME: &str = "Unknown";

const BOARD_TIME_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum BoardError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("pattern error: {0}")]
    Pattern(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StatusCode {
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "endorsed")]
    Endorsed,
    #[serde(rename = "relist")]
    Relist,
    #[serde(rename = "CUrequest")]
    CuRequest,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "clerk")]
    Clerk,
    #[serde(rename = "checked")]
    Checked,
    #[serde(rename = "new")]
    New,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "cudeclined")]
    CuDeclined,
    #[serde(rename = "declined")]
    Declined,
    #[serde(rename = "cumoreinfo")]
    CuMoreInfo,
    #[serde(rename = "moreinfo")]
    MoreInfo,
    #[serde(rename = "cuhold")]
    CuHold,
    #[serde(rename = "hold")]
    Hold,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "QUICK")]
    Quick,
}

impl StatusCode {
    pub const ALL: [Self; 17] = [
        Self::InProgress,
        Self::Endorsed,
        Self::Relist,
        Self::CuRequest,
        Self::Admin,
        Self::Clerk,
        Self::Checked,
        Self::New,
        Self::Open,
        Self::CuDeclined,
        Self::Declined,
        Self::CuMoreInfo,
        Self::MoreInfo,
        Self::CuHold,
        Self::Hold,
        Self::Close,
        Self::Quick,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "inprogress",
            Self::Endorsed => "endorsed",
            Self::Relist => "relist",
            Self::CuRequest => "CUrequest",
            Self::Admin => "admin",
            Self::Clerk => "clerk",
            Self::Checked => "checked",
            Self::New => "new",
            Self::Open => "open",
            Self::CuDeclined => "cudeclined",
            Self::Declined => "declined",
            Self::CuMoreInfo => "cumoreinfo",
            Self::MoreInfo => "moreinfo",
            Self::CuHold => "cuhold",
            Self::Hold => "hold",
            Self::Close => "close",
            Self::Quick => "QUICK",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One revision of a case page, as supplied by the edit-history provider.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Edit {
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub summary: String,
}

/// Usernames eligible to be credited as attendants (active clerks and checkusers).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct PrivilegedSet(BTreeSet<String>);

impl PrivilegedSet {
    #[must_use]
    pub fn from_groups<C, U>(clerks: C, checkusers: U) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        clerks.into_iter().map(Into::into).chain(checkusers.into_iter().map(Into::into)).collect()
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.0.contains(username)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PrivilegedSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty())
                .collect(),
        )
    }
}

/// A consistent snapshot of one open case: its tags, edit history (newest first), and page text.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaseSnapshot {
    pub title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub edits: Vec<Edit>,
    #[serde(default)]
    pub text: String,
}

impl CaseSnapshot {
    /// Case name is the first subpage segment of the title.
    ///
    /// # Errors
    /// Returns [`BoardError::Validation`] when the title has no non-empty subpage segment.
    pub fn case_name(&self) -> Result<&str, BoardError> {
        match self.title.split('/').nth(1) {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(BoardError::Validation(format!(
                "case title `{}` has no case name segment",
                self.title
            ))),
        }
    }
}

/// One presentation row of the status board.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaseRecord {
    pub case_name: String,
    pub status: StatusCode,
    pub filing_time: String,
    #[serde(default)]
    pub last_editor: String,
    #[serde(default)]
    pub last_editor_time: String,
    #[serde(default)]
    pub last_attendant: String,
    #[serde(default)]
    pub last_attendant_time: String,
}

impl CaseRecord {
    /// Validate a record supplied from outside the builder (for example the quick-request feed).
    ///
    /// # Errors
    /// Returns [`BoardError::Validation`] when the case name is blank, the attendant
    /// name/time pair is half populated, or a time field is not in board format.
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.case_name.trim().is_empty() {
            return Err(BoardError::Validation("case_name MUST be non-empty".to_string()));
        }

        if self.last_attendant.is_empty() != self.last_attendant_time.is_empty() {
            return Err(BoardError::Validation(
                "last_attendant and last_attendant_time MUST both be set or both be empty"
                    .to_string(),
            ));
        }

        if self.filing_time != UNKNOWN_FILING_TIME && parse_board_time(&self.filing_time).is_none()
        {
            return Err(BoardError::Validation(format!(
                "filing_time `{}` MUST be YYYY-MM-DD HH:MM or {UNKNOWN_FILING_TIME}",
                self.filing_time
            )));
        }

        for (field, value) in [
            ("last_editor_time", &self.last_editor_time),
            ("last_attendant_time", &self.last_attendant_time),
        ] {
            if !value.is_empty() && parse_board_time(value).is_none() {
                return Err(BoardError::Validation(format!(
                    "{field} `{value}` MUST be YYYY-MM-DD HH:MM"
                )));
            }
        }

        Ok(())
    }
}

/// Format a wall-clock time the way board rows carry it (`YYYY-MM-DD HH:MM`).
///
/// The fixed width keeps lexicographic order equal to chronological order.
#[must_use]
pub fn format_board_time(value: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        value.year(),
        u8::from(value.month()),
        value.day(),
        value.hour(),
        value.minute()
    )
}

#[must_use]
pub fn format_edit_time(value: OffsetDateTime) -> String {
    let utc = value.to_offset(UtcOffset::UTC);
    format_board_time(PrimitiveDateTime::new(utc.date(), utc.time()))
}

fn parse_board_time(value: &str) -> Option<PrimitiveDateTime> {
    let format = time::format_description::parse(BOARD_TIME_FORMAT).ok()?;
    PrimitiveDateTime::parse(value, &format).ok()
}
