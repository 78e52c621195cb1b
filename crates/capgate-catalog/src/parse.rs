//! Top-level callable discovery in catalog source.
//!
//! Only column-0 `def` / `async def` headers are considered. Bodies, imports,
//! assignments and nested definitions are skipped. Parameter lists may span
//! several lines.

/// A top-level callable header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Definition {
    pub name: String,
    pub signature: String,
    pub is_async: bool,
    pub line: usize,
}

/// Why a header could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxIssue {
    pub line: usize,
    pub reason: String,
}

impl SyntaxIssue {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Where a line starts relative to string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringState {
    Code,
    /// Inside a triple-quoted string opened with this quote byte.
    Block(u8),
}

pub(crate) fn parse_definitions(source: &str) -> Result<Vec<Definition>, SyntaxIssue> {
    let lines: Vec<&str> = source.lines().collect();
    let mut defs = Vec::new();
    let mut state = StringState::Code;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        let line_no = idx + 1;

        let header = match state {
            StringState::Code => definition_header(line),
            StringState::Block(_) => None,
        };
        let Some((is_async, rest)) = header else {
            state = carry_strings(line, state);
            idx += 1;
            continue;
        };

        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(SyntaxIssue::new(line_no, "expected a function name after 'def'"));
        }

        let after_name = rest[name_len..].trim_start();
        if !after_name.starts_with('(') {
            return Err(SyntaxIssue::new(
                line_no,
                format!("expected '(' after '{name}'"),
            ));
        }

        let (header, consumed, tail) = collect_header(&lines[idx..], after_name, line_no)?;
        defs.push(Definition {
            name: name.to_string(),
            signature: header,
            is_async,
            line: line_no,
        });
        // Text after the ':' may open a docstring.
        state = carry_strings(tail, StringState::Code);
        idx += consumed;
    }

    Ok(defs)
}

/// Follow string literals across one line and return the state at its end.
///
/// Single-quoted strings end with the line and a `#` outside literals ends
/// the scan. Only triple quotes outside other literals open or close a block.
fn carry_strings(line: &str, mut state: StringState) -> StringState {
    let bytes = line.as_bytes();
    let mut single: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let in_literal = state != StringState::Code || single.is_some();
        if in_literal && b == b'\\' {
            i += 2;
            continue;
        }
        match (state, single) {
            (StringState::Block(q), _) => {
                if is_triple(bytes, i, q) {
                    state = StringState::Code;
                    i += 3;
                } else {
                    i += 1;
                }
            }
            (StringState::Code, Some(q)) => {
                if b == q {
                    single = None;
                }
                i += 1;
            }
            (StringState::Code, None) => match b {
                b'#' => break,
                b'\'' | b'"' if is_triple(bytes, i, b) => {
                    state = StringState::Block(b);
                    i += 3;
                }
                b'\'' | b'"' => {
                    single = Some(b);
                    i += 1;
                }
                _ => i += 1,
            },
        }
    }

    state
}

fn is_triple(bytes: &[u8], at: usize, quote: u8) -> bool {
    bytes.get(at..at + 3) == Some(&[quote, quote, quote][..])
}

/// Returns `(is_async, text after "def ")` for a column-0 definition line.
fn definition_header(line: &str) -> Option<(bool, &str)> {
    if let Some(rest) = line.strip_prefix("def") {
        return rest
            .starts_with(char::is_whitespace)
            .then(|| (false, rest.trim_start()));
    }
    let rest = line.strip_prefix("async")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("def")?;
    rest.starts_with(char::is_whitespace)
        .then(|| (true, rest.trim_start()))
}

/// Read from the opening paren to the header's terminating `:`.
///
/// Returns the normalized signature text, how many lines were consumed and
/// the rest of the line after the `:`.
fn collect_header<'a>(
    lines: &[&'a str],
    first: &'a str,
    line_no: usize,
) -> Result<(String, usize, &'a str), SyntaxIssue> {
    let mut text = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut closed = false;

    for (offset, raw) in std::iter::once(first)
        .chain(lines.iter().skip(1).copied())
        .enumerate()
    {
        let segment = if offset == 0 { raw } else { raw.trim() };
        if offset > 0 && !text.ends_with('(') && !segment.starts_with(')') {
            text.push(' ');
        }

        for (pos, ch) in segment.char_indices() {
            if let Some(q) = quote {
                text.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    text.push(ch);
                }
                '#' => break,
                '(' | '[' | '{' => {
                    depth += 1;
                    text.push(ch);
                }
                ')' | ']' | '}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        SyntaxIssue::new(line_no + offset, "unbalanced parentheses")
                    })?;
                    text.push(ch);
                    if depth == 0 {
                        closed = true;
                    }
                }
                ':' if closed && depth == 0 => {
                    return Ok((text.trim().to_string(), offset + 1, &segment[pos + 1..]));
                }
                _ => text.push(ch),
            }
        }
        text.truncate(text.trim_end().len());

        if closed && depth == 0 {
            // Header closed on this line without a terminating ':'.
            return Err(SyntaxIssue::new(
                line_no + offset,
                "expected ':' after the parameter list",
            ));
        }
        quote = None;
    }

    Err(SyntaxIssue::new(
        line_no,
        "unbalanced parentheses in parameter list",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_and_async_headers() {
        let source = "\
from typing import Any

async def greet(name: str) -> str:
    \"\"\"Greet someone by name.\"\"\"
    return f\"Hello, {name}!\"

def random_numbers(n: int) -> list[float]:
    return []
";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "greet");
        assert_eq!(defs[0].signature, "(name: str) -> str");
        assert!(defs[0].is_async);
        assert_eq!(defs[0].line, 3);
        assert_eq!(defs[1].name, "random_numbers");
        assert_eq!(defs[1].signature, "(n: int) -> list[float]");
        assert!(!defs[1].is_async);
    }

    #[test]
    fn parses_multi_line_parameters() {
        let source = "\
async def calculate(
    a: int,
    b: int,
    op: str = \"add\",  # one of add/sub/mul/div
) -> int:
    return 0
";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].signature, "(a: int, b: int, op: str = \"add\",) -> int");
    }

    #[test]
    fn ignores_nested_and_body_definitions() {
        let source = "\
def outer():
    def inner():
        pass
    return inner
class Helper:
    def method(self):
        pass
";
        let names: Vec<_> = parse_definitions(source)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["outer"]);
    }

    #[test]
    fn ignores_definitions_inside_module_docstring() {
        let source = "\
\"\"\"Example:

def not_a_capability(x):
    pass
\"\"\"

def real(x):
    return x
";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "real");
    }

    #[test]
    fn parens_inside_defaults_are_not_counted() {
        let defs = parse_definitions("def f(sep: str = \")\") -> str:\n    return sep\n").unwrap();
        assert_eq!(defs[0].signature, "(sep: str = \")\") -> str");
    }

    #[test]
    fn rejects_unbalanced_parameter_list() {
        let err = parse_definitions("def broken(a, b:\n    pass\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.reason.contains("unbalanced"), "{err:?}");
    }

    #[test]
    fn rejects_missing_colon() {
        let err = parse_definitions("x = 1\ndef f(a) -> int\n    return a\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("':'"), "{err:?}");
    }

    #[test]
    fn rejects_missing_name_or_paren() {
        assert!(parse_definitions("def (x):\n    pass\n").is_err());
        assert!(parse_definitions("def 1f(x):\n    pass\n").is_err());
        assert!(parse_definitions("def f:\n    pass\n").is_err());
    }

    #[test]
    fn identifiers_starting_with_def_are_not_headers() {
        let defs = parse_definitions("default = 3\nasyncio_mode = 1\n").unwrap();
        assert!(defs.is_empty());
    }

    #[test]
    fn docstring_opened_on_header_line_keeps_definition() {
        let source = "\
async def greet(name: str) -> str:  \"\"\"Greet
    someone.\"\"\"
    return name

def after(x):
    return x
";
        let names: Vec<_> = parse_definitions(source)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["greet", "after"]);
    }

    #[test]
    fn triple_quotes_inside_plain_strings_do_not_open_blocks() {
        let source = "\
QUOTE = '\"\"\"'
OTHER = \"'''\"  # a stray ''' in a comment

async def greet(name: str) -> str:
    return name
";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "greet");
    }

    #[test]
    fn other_quote_style_inside_block_string_is_literal() {
        let source = "\
\"\"\"Use ''' freely here.

def hidden(x):
    pass
\"\"\"

def visible(x):
    return x
";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "visible");
    }

    #[test]
    fn escaped_quote_does_not_end_a_string() {
        let source = "NOTE = 'it\\'s \"\"\" here'\n\ndef f(x):\n    return x\n";
        let defs = parse_definitions(source).unwrap();
        assert_eq!(defs.len(), 1);
    }
}
