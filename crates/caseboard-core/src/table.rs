use serde::{Deserialize, Serialize};

use crate::CaseRecord;

/// Wikitext markers wrapped around the board rows.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TableTemplate {
    pub header: String,
    pub footer: String,
    pub empty_marker: String,
    pub row_template: String,
}

impl Default for TableTemplate {
    fn default() -> Self {
        Self {
            header: "{{SPIstatusheader}}".to_string(),
            footer: "|}".to_string(),
            empty_marker: "{{SPIstatusentry/none}}".to_string(),
            row_template: "SPIstatusentry".to_string(),
        }
    }
}

impl TableTemplate {
    /// One positional template call: name, status, filing time, last editor and time,
    /// last attendant and time.
    #[must_use]
    pub fn render_row(&self, record: &CaseRecord) -> String {
        format!(
            "{{{{{}|{}|{}|{}|{}|{}|{}|{}}}}}",
            self.row_template,
            record.case_name,
            record.status,
            record.filing_time,
            record.last_editor,
            record.last_editor_time,
            record.last_attendant,
            record.last_attendant_time
        )
    }
}

#[must_use]
pub fn render_table(records: &[CaseRecord], template: &TableTemplate) -> String {
    let mut out = String::new();
    out.push_str(&template.header);
    out.push('\n');

    if records.is_empty() {
        out.push_str(&template.empty_marker);
        out.push('\n');
    }
    for record in records {
        out.push_str(&template.render_row(record));
        out.push('\n');
    }

    out.push_str(&template.footer);
    out
}

/// Edit summary used when the rendered table is saved.
#[must_use]
pub fn edit_summary(active_reports: usize) -> String {
    format!("Updating SPI case list ({active_reports} active reports)")
}
