use std::borrow::Cow;

use chrono::SecondsFormat;

use crate::model::{ExportFormat, OverrideQuery};
use crate::service::{AccessError, AccessService};

const EXPORT_HEADER: [&str; 5] = ["screen", "operations", "starts_at", "ends_at", "status"];

impl AccessService {
    /// Render a user's full override history as delimited text.
    pub fn export_overrides(&self, user_id: &str, format: ExportFormat) -> Result<String, AccessError> {
        let rows = self.list_overrides(user_id, &OverrideQuery::default())?;
        let delimiter = format.delimiter();

        let mut out = String::new();
        write_record(&mut out, delimiter, &EXPORT_HEADER);
        for row in &rows {
            let entry = &row.entry;
            write_record(
                &mut out,
                delimiter,
                &[
                    row.screen_path.as_str(),
                    &entry.operations.to_compact(),
                    &entry.starts_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    &entry.ends_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    entry.status.as_str(),
                ],
            );
        }
        Ok(out)
    }
}

fn write_record(out: &mut String, delimiter: char, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(&quote(field, delimiter));
    }
    out.push('\n');
}

/// Quote a field when it holds the delimiter, a quote or a line break.
fn quote(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains(|c: char| c == delimiter || c == '"' || c == '\n' || c == '\r') {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
