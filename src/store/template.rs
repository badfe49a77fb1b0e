pub const PREDICATE_MARKER: &str = "{predicate}";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template must contain exactly one {marker} marker, found {0}", marker = PREDICATE_MARKER)]
    MarkerCount(usize),

    #[error("invalid table name '{0}': expected identifier or schema.identifier")]
    InvalidTable(String),
}

/// A trusted statement shell with a single slot for the translated where clause.
///
/// Values have no slot; they reach the store only through positional binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTemplate {
    prefix: String,
    suffix: String,
}

impl TableTemplate {
    pub fn new(shell: &str) -> Result<Self, TemplateError> {
        let count = shell.matches(PREDICATE_MARKER).count();
        match shell.split_once(PREDICATE_MARKER) {
            Some((prefix, suffix)) if count == 1 => Ok(Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(TemplateError::MarkerCount(count)),
        }
    }

    /// `SELECT * FROM "<table>" WHERE {predicate}`.
    pub fn select_all(table: &str) -> Result<Self, TemplateError> {
        if !is_valid_table_name(table) {
            return Err(TemplateError::InvalidTable(table.to_string()));
        }
        let quoted = table
            .split('.')
            .map(|part| format!("\"{part}\""))
            .collect::<Vec<_>>()
            .join(".");
        Self::new(&format!("SELECT * FROM {quoted} WHERE {PREDICATE_MARKER}"))
    }

    /// The where clause is parenthesized so `OR` inside it cannot escape
    /// conditions the shell places after the marker.
    pub fn render(&self, where_clause: &str) -> String {
        format!("{}({}){}", self.prefix, where_clause, self.suffix)
    }
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_table_name(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| is_valid_identifier(p))
}
