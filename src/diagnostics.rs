use crate::{executor::RuntimeFailure, lexer::Position, parser::ParseError};

/// Renders one problem with the offending source line and a caret under the
/// reported column.
///
/// ```text
/// error[syntax]: unexpected end of input, expected an expression
///  --> line 2:6
///   |
/// 2 |  x <-
///   |      ^
/// ```
pub fn render(source: &str, kind: &str, position: Position, message: &str) -> String {
    let source_line = source.lines().nth(position.line.saturating_sub(1)).unwrap_or("");
    let gutter = position.line.to_string().len();

    let padding: String = source_line
        .chars()
        .take(position.column.saturating_sub(1))
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();

    let mut out = format!("error[{kind}]: {message}\n");
    out += &format!("{:>gutter$}--> line {position}\n", " ");
    out += &format!("{:>gutter$} |\n", " ");
    out += &format!("{:>gutter$} | {source_line}\n", position.line);
    out += &format!("{:>gutter$} | {padding}^\n", " ");
    out
}

pub fn render_parse_error(source: &str, error: &ParseError) -> String {
    let message = error.to_string();
    // the position is already shown by the `-->` line
    let message = message
        .strip_prefix(&format!("{}: ", error.position))
        .unwrap_or(&message);
    render(source, "syntax", error.position, message)
}

pub fn render_failure(source: &str, failure: &RuntimeFailure) -> String {
    render(
        source,
        &failure.kind.to_string(),
        failure.position,
        &failure.message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_points_at_the_column() {
        let out = render(
            "INICIO\n x <- 1 / 0\nFIN",
            "division by zero",
            Position::new(2, 2),
            "1 / 0",
        );
        assert_eq!(
            out,
            "error[division by zero]: 1 / 0
 --> line 2:2
  |
2 |  x <- 1 / 0
  |  ^
"
        );
    }

    #[test]
    fn missing_line_renders_empty() {
        let out = render("", "syntax", Position::new(3, 1), "unexpected end of input");
        assert!(out.contains("3 | \n"));
    }
}
