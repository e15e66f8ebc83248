//! XPath subset translated to CSS selectors
//!
//! `scraper` only evaluates CSS, so location paths are rewritten into an
//! equivalent selector before compilation. Supported:
//! - `/` child and `//` descendant steps, optional leading `.` context
//! - element names or `*`
//! - predicates `[@a]`, `[@a='v']`, `[contains(@a,'v')]`,
//!   `[starts-with(@a,'v')]`, combined with `and`
//! - `[n]` and `[last()]`, only as the first predicate of a step and on their own
//!
//! A leading `/` anchors the first step at the document root, so absolute
//! paths are only accepted where a document is the context (base selectors).

use crate::error::ConfigError;

/// Result of translating an XPath expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translated {
    /// `.`: the context node itself
    SelfNode,
    /// Equivalent CSS selector
    Css(String),
}

/// Whether a selector string should be read as XPath rather than CSS
pub fn is_xpath(expr: &str) -> bool {
    let e = expr.trim();
    e == "." || e.starts_with('/') || e.starts_with("./") || e.starts_with('(')
}

/// Translate an XPath location path into a CSS selector
pub fn translate(expr: &str) -> Result<Translated, ConfigError> {
    let unsupported = |reason: &str| ConfigError::UnsupportedXPath {
        expression: expr.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = expr.trim();
    if rest == "." {
        return Ok(Translated::SelfNode);
    }

    let relative = rest.starts_with("./");
    if relative {
        rest = &rest[1..];
    }
    if !rest.starts_with('/') {
        return Err(unsupported("expected a location path starting with `/`, `//` or `./`"));
    }

    let mut css = String::new();
    let mut first = true;

    while !rest.is_empty() {
        let descendant = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            true
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            false
        } else {
            return Err(unsupported("expected `/` between steps"));
        };

        let (step, remaining) = split_step(rest).ok_or_else(|| unsupported("unbalanced brackets or quotes"))?;
        rest = remaining;
        if step.is_empty() {
            return Err(unsupported("empty location step"));
        }
        let step_css = translate_step(step).map_err(|reason| unsupported(&reason))?;

        if first {
            match (relative, descendant) {
                (true, true) => css.push_str(":scope "),
                (true, false) => css.push_str(":scope > "),
                (false, true) => {}
                (false, false) => {
                    css.push_str(&step_css);
                    css.push_str(":root");
                    first = false;
                    continue;
                }
            }
        } else {
            css.push_str(if descendant { " " } else { " > " });
        }
        css.push_str(&step_css);
        first = false;
    }

    Ok(Translated::Css(css))
}

/// Split off one step: everything up to the next `/` outside brackets and quotes
fn split_step(input: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.checked_sub(1)?,
                '/' if depth == 0 => return Some((input[..i].trim(), &input[i..])),
                _ => {}
            },
        }
    }

    if depth != 0 || quote.is_some() {
        return None;
    }
    Some((input.trim(), ""))
}

fn translate_step(step: &str) -> Result<String, String> {
    if step.starts_with('@') {
        return Err("attribute steps are not supported; use attribute mode instead".into());
    }
    if step.contains("::") || step == ".." || (step.contains("()") && !step.contains('[')) {
        return Err(format!("step `{}` is not supported", step));
    }

    let name_end = step.find('[').unwrap_or(step.len());
    let name = step[..name_end].trim();
    if name != "*" && !is_ident(name) {
        return Err(format!("invalid node test `{}`", name));
    }

    let mut css = name.to_string();
    let mut preds = &step[name_end..];
    let mut index = 0;
    while !preds.is_empty() {
        let close = matching_bracket(preds).ok_or("unbalanced predicate")?;
        let body = preds[1..close].trim();
        let conds = split_and(body);
        // CSS positions count every sibling, so no filter may precede them
        if conds.iter().any(|c| is_positional(c.trim())) && (index > 0 || conds.len() > 1) {
            return Err("a position is only supported as the first predicate, on its own".into());
        }
        for cond in conds {
            css.push_str(&translate_condition(cond.trim(), name == "*")?);
        }
        index += 1;
        preds = preds[close + 1..].trim_start();
        if !preds.is_empty() && !preds.starts_with('[') {
            return Err(format!("unexpected `{}` after predicate", preds));
        }
    }

    Ok(css)
}

/// Index of the `]` closing the predicate that opens at position 0
fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split a predicate body on top-level ` and `
fn split_and(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        if i < start {
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if body[i..].starts_with(" and ") => {
                parts.push(&body[start..i]);
                start = i + 5;
            }
            None => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn is_positional(cond: &str) -> bool {
    cond == "last()" || cond.parse::<usize>().is_ok()
}

fn translate_condition(cond: &str, any_element: bool) -> Result<String, String> {
    if let Ok(n) = cond.parse::<usize>() {
        if n == 0 {
            return Err("positions start at 1".into());
        }
        return Ok(if any_element {
            format!(":nth-child({})", n)
        } else {
            format!(":nth-of-type({})", n)
        });
    }
    if cond == "last()" {
        return Ok(if any_element { ":last-child" } else { ":last-of-type" }.to_string());
    }

    for (func, op) in [("contains(", "*="), ("starts-with(", "^=")] {
        if let Some(args) = cond.strip_prefix(func).and_then(|a| a.strip_suffix(')')) {
            let (attr, value) = args.split_once(',').ok_or("expected two arguments")?;
            let attr = attribute_name(attr.trim())?;
            let value = literal(value.trim())?;
            return Ok(format!("[{}{}{}]", attr, op, quote_css(&value)));
        }
    }

    if let Some((lhs, rhs)) = cond.split_once('=') {
        let attr = attribute_name(lhs.trim())?;
        let value = literal(rhs.trim())?;
        return Ok(format!("[{}={}]", attr, quote_css(&value)));
    }

    if cond.starts_with('@') {
        return Ok(format!("[{}]", attribute_name(cond)?));
    }

    Err(format!("predicate `{}` is not supported", cond))
}

fn attribute_name(s: &str) -> Result<&str, String> {
    let name = s.strip_prefix('@').ok_or_else(|| format!("expected an attribute, found `{}`", s))?;
    if is_ident(name) {
        Ok(name)
    } else {
        Err(format!("invalid attribute name `{}`", name))
    }
}

fn literal(s: &str) -> Result<String, String> {
    let inner = s
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
        .ok_or_else(|| format!("expected a quoted string, found `{}`", s))?;
    Ok(inner.to_string())
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit() || c == '-')
}

fn quote_css(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
