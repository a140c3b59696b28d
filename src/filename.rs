//! Filename templating grammar (spec.md §6.2).
//!
//! `{root:/data} {template:sub-{p}_run-{r}.xdf} {p:001} {r:baseline}`
//! resolves to `/data/sub-001_run-baseline.xdf`. A spec containing no
//! `{...}` tokens at all is taken as a plain path, verbatim.

use crate::error::RecorderError;
use std::collections::HashMap;

/// Resolve a `set_filename` argument to a concrete path.
///
/// # Errors
/// Returns [`RecorderError::BadRequest`] if the template references a
/// variable with no matching token, or if a `{template:...}` token is
/// present without a `root`.
pub fn resolve(spec: &str) -> Result<String, RecorderError> {
    if !spec.contains('{') {
        return Ok(spec.to_string());
    }

    let tokens = parse_tokens(spec)?;
    let root = tokens.get("root").ok_or_else(|| {
        RecorderError::BadRequest("filename template requires a {root:...} token".into())
    })?;
    let template = tokens.get("template").ok_or_else(|| {
        RecorderError::BadRequest("filename template requires a {template:...} token".into())
    })?;

    let expanded = expand_template(template, &tokens)?;
    Ok(format!("{}/{}", root.trim_end_matches('/'), expanded))
}

/// Split `{key:value}` tokens at brace depth 0, honoring nested braces inside
/// a value (the `template` token's value legally contains `{var}` markers).
fn parse_tokens(spec: &str) -> Result<HashMap<String, String>, RecorderError> {
    let mut tokens = HashMap::new();
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '{' => {
                let start = i;
                let mut depth = 0i32;
                loop {
                    if i >= chars.len() {
                        return Err(RecorderError::BadRequest(format!(
                            "unterminated token in filename spec: {spec}"
                        )));
                    }
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                let inner: String = chars[start + 1..i - 1].iter().collect();
                let (key, value) = inner.split_once(':').ok_or_else(|| {
                    RecorderError::BadRequest(format!("malformed token {{{inner}}}, expected key:value"))
                })?;
                tokens.insert(key.to_string(), value.to_string());
            }
            other => {
                return Err(RecorderError::BadRequest(format!(
                    "unexpected character {other:?} outside a {{...}} token in filename spec"
                )))
            }
        }
    }
    Ok(tokens)
}

/// Replace every `{var}` placeholder in `template` with `tokens[var]`.
fn expand_template(template: &str, tokens: &HashMap<String, String>) -> Result<String, RecorderError> {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&c| c == '}')
                .map(|p| start + p)
                .ok_or_else(|| {
                    RecorderError::BadRequest(format!("unterminated placeholder in template {template}"))
                })?;
            let var: String = chars[start..end].iter().collect();
            let value = tokens.get(&var).ok_or_else(|| {
                RecorderError::BadRequest(format!("template references unknown variable {{{var}}}"))
            })?;
            out.push_str(value);
            i = end + 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}
