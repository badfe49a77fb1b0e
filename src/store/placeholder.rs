//! Placeholder dialect adaptation for SQLite.
//!
//! Translation services emit placeholders in the style of their target dialect:
//! `$1` for postgres, `%s` for DB-API drivers, `?` for mysql/sqlite. SQLite
//! accepts `?`, `?NNN`, `:name`, `@name`; the first two foreign styles are
//! rewritten, everything else is copied as-is. Quoted literals and identifiers
//! are never touched, so `LIKE '%sale%'` survives. A `$` or `%` that continues
//! a bare word is part of that word (`price$1`, `a%s` as modulo), not a
//! placeholder.

/// Characters SQLite accepts inside an unquoted identifier.
fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn to_sqlite(where_clause: &str) -> String {
    let mut out = String::with_capacity(where_clause.len());
    let mut chars = where_clause.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                // doubled quote is an escaped quote, still inside the literal
                if chars.peek() == Some(&q) {
                    out.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        let in_word = out.chars().next_back().is_some_and(is_ident_char);
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '%' if !in_word && chars.peek() == Some(&'s') => {
                chars.next();
                out.push('?');
            }
            '$' if !in_word && chars.peek().is_some_and(char::is_ascii_digit) => {
                out.push('?');
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    out.push(d);
                }
            }
            _ => out.push(c),
        }
    }

    out
}
