//! Recursive-descent parser for the wrapper reference micro-syntax.
//!
//! A wrapper string has the shape `%{kind}tag(content)`: `kind` names a
//! resolution strategy, `tag` is an opaque trace label, and `content` is
//! either a terminal payload or another wrapper. The parser produces an
//! explicit AST so recursive resolution is structural rather than
//! string-matching.

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// Parsed form of a wrapper reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperExpr {
    /// Plain text; no wrapper syntax (or unparseable wrapper syntax,
    /// which deliberately degrades to the raw string).
    Literal(String),
    /// A `%{kind}tag(content)` reference.
    Wrapped {
        kind: String,
        /// Opaque label used only for traceability, never for resolution.
        tag: String,
        content: Box<WrapperExpr>,
    },
}

impl WrapperExpr {
    /// Parse a string into a wrapper expression.
    ///
    /// Only a string that is a single well-formed wrapper from start to
    /// end parses as `Wrapped`; anything else is a `Literal`. The content
    /// is parsed recursively, so `%{a}t1(%{b}t2(x))` nests structurally.
    pub fn parse(input: &str) -> WrapperExpr {
        match try_parse_wrapper(input) {
            Some(expr) => expr,
            None => WrapperExpr::Literal(input.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser internals
// ---------------------------------------------------------------------------

/// Attempt to parse `input` as exactly one wrapper. Returns `None` when the
/// input is not a complete, balanced wrapper expression.
fn try_parse_wrapper(input: &str) -> Option<WrapperExpr> {
    let rest = input.strip_prefix("%{")?;

    let kind_end = rest.find('}')?;
    let kind = &rest[..kind_end];
    if kind.is_empty() {
        return None;
    }

    let rest = &rest[kind_end + 1..];
    let tag_end = rest.find('(')?;
    let tag = &rest[..tag_end];

    // Content runs to the matching close paren, which must also be the
    // final character of the input.
    let body = &rest[tag_end + 1..];
    let content_len = matching_paren(body)?;
    if content_len + 1 != body.len() {
        return None;
    }
    let content = &body[..content_len];

    Some(WrapperExpr::Wrapped {
        kind: kind.to_string(),
        tag: tag.to_string(),
        content: Box::new(WrapperExpr::parse(content)),
    })
}

/// Given text immediately after an opening paren, return the byte offset of
/// the matching close paren, honoring nesting.
fn matching_paren(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_wrapper() {
        let expr = WrapperExpr::parse("%{file}f1(notes.txt)");
        assert_eq!(
            expr,
            WrapperExpr::Wrapped {
                kind: "file".to_string(),
                tag: "f1".to_string(),
                content: Box::new(WrapperExpr::Literal("notes.txt".to_string())),
            }
        );
    }

    #[test]
    fn parses_nested_wrapper() {
        let expr = WrapperExpr::parse("%{file}outer(%{script}inner(run.sh))");
        let WrapperExpr::Wrapped { kind, content, .. } = expr else {
            panic!("expected wrapped");
        };
        assert_eq!(kind, "file");
        assert_eq!(
            *content,
            WrapperExpr::Wrapped {
                kind: "script".to_string(),
                tag: "inner".to_string(),
                content: Box::new(WrapperExpr::Literal("run.sh".to_string())),
            }
        );
    }

    #[test]
    fn content_with_balanced_parens_stays_literal() {
        let expr = WrapperExpr::parse("%{note}n(a (b) c)");
        let WrapperExpr::Wrapped { content, .. } = expr else {
            panic!("expected wrapped");
        };
        assert_eq!(*content, WrapperExpr::Literal("a (b) c".to_string()));
    }

    #[test]
    fn plain_text_is_literal() {
        assert_eq!(
            WrapperExpr::parse("hello"),
            WrapperExpr::Literal("hello".to_string())
        );
    }

    #[test]
    fn trailing_text_after_wrapper_is_literal() {
        // Not a complete wrapper from start to end.
        let expr = WrapperExpr::parse("%{dir}d(out)/file.txt");
        assert_eq!(
            expr,
            WrapperExpr::Literal("%{dir}d(out)/file.txt".to_string())
        );
    }

    #[test]
    fn malformed_wrappers_are_literals() {
        for raw in ["%{}t(x)", "%{kind}t(x", "%{kind", "%{kind}t", "%kind}t(x)"] {
            assert_eq!(
                WrapperExpr::parse(raw),
                WrapperExpr::Literal(raw.to_string()),
                "input: {raw}"
            );
        }
    }

    #[test]
    fn empty_tag_is_allowed() {
        let expr = WrapperExpr::parse("%{file}(notes.txt)");
        let WrapperExpr::Wrapped { tag, .. } = expr else {
            panic!("expected wrapped");
        };
        assert_eq!(tag, "");
    }
}
