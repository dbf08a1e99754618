use regex_lite::{Captures, Regex};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::{format_board_time, BoardError, UNKNOWN_FILING_TIME};

const MONTH_ALTERNATION: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

const MONTH_NAMES: [(&str, Month); 12] = [
    ("January", Month::January),
    ("February", Month::February),
    ("March", Month::March),
    ("April", Month::April),
    ("May", Month::May),
    ("June", Month::June),
    ("July", Month::July),
    ("August", Month::August),
    ("September", Month::September),
    ("October", Month::October),
    ("November", Month::November),
    ("December", Month::December),
];

/// Finds signature timestamps such as `03:00, 1 January 2024 (UTC)` in page text.
#[derive(Debug, Clone)]
pub struct TimestampExtractor {
    signatures: Vec<Regex>,
}

impl TimestampExtractor {
    /// Compile the signature patterns (day-month-year and month-day-year forms).
    ///
    /// # Errors
    /// Returns [`BoardError::Pattern`] when a signature pattern fails to compile.
    pub fn new() -> Result<Self, BoardError> {
        let patterns = [
            format!(
                r"\b(?P<hour>\d{{1,2}}):(?P<minute>\d{{2}}),\s+(?P<day>\d{{1,2}})\s+(?P<month>{MONTH_ALTERNATION})\s+(?P<year>\d{{4}})\s+\(UTC\)"
            ),
            format!(
                r"\b(?P<hour>\d{{1,2}}):(?P<minute>\d{{2}}),\s+(?P<month>{MONTH_ALTERNATION})\s+(?P<day>\d{{1,2}}),\s+(?P<year>\d{{4}})\s+\(UTC\)"
            ),
        ];

        let signatures = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    BoardError::Pattern(format!("invalid signature pattern: {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { signatures })
    }

    /// Leftmost valid signature timestamp in one line, if any.
    #[must_use]
    pub fn find_in_line(&self, line: &str) -> Option<PrimitiveDateTime> {
        self.signatures
            .iter()
            .filter_map(|signature| {
                signature.captures_iter(line).find_map(|captures| {
                    let start = captures.get(0)?.start();
                    Some((start, datetime_from_captures(&captures)?))
                })
            })
            .min_by_key(|(start, _)| *start)
            .map(|(_, value)| value)
    }

    /// First signature timestamp in document order; later lines are not inspected.
    #[must_use]
    pub fn first_signature<'a, I>(&self, lines: I) -> Option<PrimitiveDateTime>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines.into_iter().find_map(|line| self.find_in_line(line))
    }

    /// Board-formatted filing time, or the `Unknown` sentinel.
    #[must_use]
    pub fn filing_time<'a, I>(&self, lines: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.first_signature(lines)
            .map_or_else(|| UNKNOWN_FILING_TIME.to_string(), format_board_time)
    }
}

fn datetime_from_captures(captures: &Captures<'_>) -> Option<PrimitiveDateTime> {
    let number = |name: &str| captures.name(name)?.as_str().parse::<u16>().ok();
    let month_name = captures.name("month")?.as_str();
    let month =
        MONTH_NAMES.iter().find(|(name, _)| *name == month_name).map(|(_, month)| *month)?;

    let year = i32::from(number("year")?);
    let day = u8::try_from(number("day")?).ok()?;
    let hour = u8::try_from(number("hour")?).ok()?;
    let minute = u8::try_from(number("minute")?).ok()?;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, 0).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}
