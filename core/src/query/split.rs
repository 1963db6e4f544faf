/// Splits the text of a query file into individual statements.
///
/// Statements end at `;` outside of string literals, quoted identifiers and
/// comments. Pieces that hold nothing but whitespace and comments are dropped.
pub fn split_queries(text: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        SingleQuoted,
        DoubleQuoted,
        LineComment,
        BlockComment,
    }

    let mut queries = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = State::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                ';' => {
                    if has_code {
                        queries.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    continue;
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    current.push_str("--");
                    state = State::LineComment;
                    continue;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    current.push_str("/*");
                    state = State::BlockComment;
                    continue;
                }
                '\'' => state = State::SingleQuoted,
                '"' => state = State::DoubleQuoted,
                _ => {}
            },
            State::SingleQuoted => {
                if c == '\'' {
                    // '' is an escaped quote inside the literal.
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        current.push_str("''");
                        continue;
                    }
                    state = State::Code;
                }
            }
            State::DoubleQuoted => {
                if c == '"' {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push_str("*/");
                    state = State::Code;
                    continue;
                }
            }
        }
        if matches!(state, State::Code | State::SingleQuoted | State::DoubleQuoted)
            && !c.is_whitespace()
        {
            has_code = true;
        }
        current.push(c);
    }

    if has_code {
        queries.push(current.trim().to_string());
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_on_semicolons() {
        assert_eq!(
            split_queries("select 1;\nselect 2;\n\nselect 3"),
            vec!["select 1", "select 2", "select 3"]
        );
    }

    #[test]
    fn ignores_semicolons_in_literals_and_identifiers() {
        assert_eq!(
            split_queries("select 'a;b', 'it''s;' from \"t;1\";select 2;"),
            vec!["select 'a;b', 'it''s;' from \"t;1\"", "select 2"]
        );
    }

    #[test]
    fn ignores_semicolons_in_comments() {
        let text = "-- first; query\nselect 1 /* inline; note */;\n/* trailing; */\n-- done;\n";
        assert_eq!(
            split_queries(text),
            vec!["-- first; query\nselect 1 /* inline; note */"]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_queries("  ;\n ; ").is_empty());
    }
}
