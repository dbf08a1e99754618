//! Clerk roster parsing.
//!
//! The roster page lists clerks as `{{user|Name}}`-style templates under an
//! "Active clerks" heading, followed by an "Inactive clerks" section that must
//! not be counted.

use regex_lite::Regex;

use crate::BoardError;

pub const ACTIVE_SECTION_MARKER: &str = "Active clerks";
pub const INACTIVE_SECTION_MARKER: &str = "inactive clerks";

const USER_TEMPLATE_PATTERN: &str = r"\{\{[uU]ser[^|]*\|([^}]+)\}\}";

/// Usernames listed in the active-clerks section of the roster page, in page order.
///
/// # Errors
/// Returns [`BoardError::Pattern`] when the user-template pattern fails to compile.
pub fn parse_clerk_roster(text: &str) -> Result<Vec<String>, BoardError> {
    let user_template = Regex::new(USER_TEMPLATE_PATTERN)
        .map_err(|err| BoardError::Pattern(format!("invalid user template pattern: {err}")))?;

    let clerks = text
        .lines()
        .skip_while(|line| !line.contains(ACTIVE_SECTION_MARKER))
        .take_while(|line| !line.to_lowercase().contains(INACTIVE_SECTION_MARKER))
        .filter_map(|line| user_template.captures(line))
        .filter_map(|captures| captures.get(1).map(|name| name.as_str().trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect();

    Ok(clerks)
}
