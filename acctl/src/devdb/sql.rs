//! Splitting migration scripts into individually executable statements.
//!
//! Migration files are applied one statement at a time so that an "already exists" failure on the
//! first statement of a file does not prevent the remaining statements from running. The splitter
//! understands just enough SQLite lexical structure to find statement boundaries: quoted strings and
//! identifiers (`'..'`, `".."`, `` `..` ``, `[..]`), line and block comments, and the
//! `BEGIN ... END` body of `CREATE TRIGGER`.

/// The comment marker used by migration files.
pub const LINE_COMMENT: &str = "--";

/// True if the script has at least one line that is neither blank nor a line comment.
pub fn has_content(sql: &str) -> bool {
    sql.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with(LINE_COMMENT)
    })
}

/// Split a script into statements, each without its terminating `;`.
///
/// Statements that consist only of whitespace and comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    // Significant (non-comment, non-literal) words of the current statement, uppercased.
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut trigger_depth = 0usize;
    let mut i = 0;

    let flush_word = |word: &mut String, words: &mut Vec<String>, trigger_depth: &mut usize| {
        if word.is_empty() {
            return;
        }
        let upper = word.to_ascii_uppercase();
        let in_trigger = words.len() >= 2 && words[0] == "CREATE" && words.iter().take(4).any(|w| w == "TRIGGER");
        if in_trigger {
            if upper == "BEGIN" || upper == "CASE" {
                *trigger_depth += 1;
            } else if upper == "END" && *trigger_depth > 0 {
                *trigger_depth -= 1;
            }
        }
        words.push(upper);
        word.clear();
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '-' if next == Some('-') => {
                flush_word(&mut word, &mut words, &mut trigger_depth);
                while i < chars.len() && chars[i] != '\n' {
                    current.push(chars[i]);
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                flush_word(&mut word, &mut words, &mut trigger_depth);
                current.push_str("/*");
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    current.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    current.push_str("*/");
                    i += 2;
                }
                continue;
            }
            '\'' | '"' | '`' | '[' => {
                flush_word(&mut word, &mut words, &mut trigger_depth);
                let close = if c == '[' { ']' } else { c };
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == close {
                        // Doubled quote is an escaped quote, not the end of the literal.
                        if close != ']' && chars.get(i + 1) == Some(&close) {
                            current.push(close);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                // A literal still counts as a token for the statement.
                words.push(String::from("<literal>"));
                continue;
            }
            ';' => {
                flush_word(&mut word, &mut words, &mut trigger_depth);
                if trigger_depth == 0 {
                    push_statement(&mut statements, &current, &words);
                    current.clear();
                    words.clear();
                } else {
                    current.push(c);
                }
                i += 1;
                continue;
            }
            c if c.is_alphanumeric() || c == '_' => word.push(c),
            _ => flush_word(&mut word, &mut words, &mut trigger_depth),
        }

        current.push(c);
        i += 1;
    }

    flush_word(&mut word, &mut words, &mut trigger_depth);
    push_statement(&mut statements, &current, &words);
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str, words: &[String]) {
    let trimmed = text.trim();
    if !words.is_empty() && !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
