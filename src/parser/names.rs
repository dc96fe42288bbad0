use sqlparser::ast::{Ident, ObjectName};

/// Return the identifier without surrounding double quotes.
pub fn unquote_identifier(ident: &str) -> &str {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// Fold an identifier the way `PostgreSQL` does.
///
/// Quoted identifiers keep their case (with `""` unescaped); unquoted ones are lowercased.
pub fn fold_identifier(ident: &str) -> String {
    let trimmed = ident.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return unquote_identifier(trimmed).replace("\"\"", "\"");
    }
    trimmed.to_ascii_lowercase()
}

/// Fold a parsed [`Ident`], honoring its quote style.
pub fn fold_ident(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_ascii_lowercase()
    }
}

/// Quote an identifier for use in generated SQL, only when required.
pub fn quote_identifier(ident: &str) -> String {
    let plain = !ident.is_empty()
        && ident
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_lowercase() || ch == '_')
        && ident
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Split a dotted name into its parts, keeping dots inside quoted identifiers.
///
/// Each part is returned as written, quotes included.
pub fn split_name_parts(name: &str) -> Vec<&str> {
    let mut in_quotes = false;
    let mut start = 0usize;
    let mut parts = Vec::new();

    for (idx, ch) in name.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                parts.push(name[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(name[start..].trim());
    parts
}

/// Split a potentially schema-qualified name into folded `(schema, relation)`.
///
/// A leading database component (`db.schema.rel`) is ignored.
pub fn split_schema_and_relation(name: &str) -> (Option<String>, String) {
    let parts = split_name_parts(name);
    match parts.as_slice() {
        [.., schema, relation] => (Some(fold_identifier(schema)), fold_identifier(relation)),
        [relation] => (None, fold_identifier(relation)),
        [] => (None, String::new()),
    }
}

/// Folded `(schema, relation)` for a parsed object name.
pub fn object_name_parts(name: &ObjectName) -> (Option<String>, String) {
    split_schema_and_relation(&name.to_string())
}
