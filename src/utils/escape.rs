/// Escapes regex metacharacters so user input matches literally in a
/// MongoDB `$regex` query.
pub fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(
            c,
            '.' | '*' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\' | '/'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes a string literal for an OData `$filter` expression.
pub fn escape_odata(input: &str) -> String {
    input.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape_regex("(1996)"), "\\(1996\\)");
        assert_eq!(escape_regex("plain text"), "plain text");
    }

    #[test]
    fn odata_quotes_are_doubled() {
        assert_eq!(escape_odata("Côte d'Ivoire"), "Côte d''Ivoire");
        assert_eq!(escape_odata("Kenya"), "Kenya");
    }
}
