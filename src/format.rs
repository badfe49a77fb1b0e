use rsearch_client::ResultRecord;

/// Escape characters that break a Markdown table cell: `|` and line breaks.
fn escape_cell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '|' => out.push_str("\\|"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Column union across records, in first-seen order.
fn columns(records: &[ResultRecord]) -> Vec<&str> {
    let mut cols: Vec<&str> = Vec::new();
    for record in records {
        for c in record.columns() {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
    }
    cols
}

pub fn format_table(records: &[ResultRecord]) -> String {
    if records.is_empty() {
        return "(no matching records)\n".to_string();
    }

    let cols = columns(records);
    let mut out = String::new();

    out.push('|');
    for c in &cols {
        out.push_str(&format!(" {} |", escape_cell(c)));
    }
    out.push_str("\n|");
    for _ in &cols {
        out.push_str("---|");
    }
    out.push('\n');

    for record in records {
        out.push('|');
        for c in &cols {
            let cell = record.get(c).map(ToString::to_string).unwrap_or_default();
            out.push_str(&format!(" {} |", escape_cell(&cell)));
        }
        out.push('\n');
    }

    let n = records.len();
    out.push_str(&format!("\n{n} record{}\n", if n == 1 { "" } else { "s" }));
    out
}

/// One JSON object per line, columns in result order.
pub fn format_json_lines(records: &[ResultRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// One-line summary used by the examples runner.
pub fn summarize(record: &ResultRecord) -> String {
    record
        .iter()
        .take(4)
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
