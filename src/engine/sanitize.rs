//! Scrubs host paths out of compiler and runtime diagnostics.
//!
//! References to the submission's source file become the language placeholder
//! (`YourCode.cpp`, ...) and `path:line:col:` style locations become `Line ...`.
//! Text that matches nothing is returned as is.

use std::path::{Path, PathBuf};

use crate::engine::sandbox::{Language, LanguageSpec};

const PY_FRAME_PREFIX: &str = "File \"";
const PY_FRAME_LINE: &str = "\", line ";

pub fn sanitize(text: &str, language: Language) -> String {
    let spec = LanguageSpec::for_language(language);
    let name = spec.source_name;

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(name) {
        let name_start = search_from + found;
        let name_end = name_start + name.len();
        search_from = name_end;

        if !ends_at_boundary(text, name_end) {
            continue;
        }
        let Some(path_start) = path_start(text, name_start) else {
            continue;
        };

        let (start, end, replacement) =
            rewrite(text, language, spec.placeholder, path_start, name_end);
        if start < copied {
            continue;
        }
        out.push_str(&text[copied..start]);
        out.push_str(&replacement);
        copied = end;
        search_from = end;
    }

    out.push_str(&text[copied..]);
    out
}

/// Strips the absolute workspace directory from whatever text is left.
pub fn redact_dir(text: &str, dir: &Path) -> String {
    let dir = dir.display().to_string();
    if dir.is_empty() || dir == "/" {
        return text.to_string();
    }
    text.replace(&format!("{dir}/"), "").replace(&dir, ".")
}

/// Sanitizer bound to one submission's language and workspace.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    language: Language,
    work_dir: PathBuf,
}

impl Sanitizer {
    pub fn new(language: Language, work_dir: &Path) -> Self {
        Self {
            language,
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn clean(&self, text: &str) -> String {
        redact_dir(&sanitize(text, self.language), &self.work_dir)
    }
}

fn is_path_char(c: char) -> bool {
    !c.is_whitespace()
        && !matches!(
            c,
            '"' | '\'' | '(' | ')' | '<' | '>' | ',' | ';' | '`' | '[' | ']' | '=' | ':'
        )
}

fn ends_at_boundary(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
}

/// Start of the path that ends in the file name at `name_start`, or `None` when
/// the name is only the tail of a longer file name.
fn path_start(text: &str, name_start: usize) -> Option<usize> {
    let before = &text[..name_start];
    match before.chars().next_back() {
        Some('/') | Some('\\') => Some(
            before
                .char_indices()
                .rev()
                .take_while(|(_, c)| is_path_char(*c))
                .last()
                .map_or(name_start, |(i, _)| i),
        ),
        Some(c) if is_path_char(c) => None,
        _ => Some(name_start),
    }
}

fn rewrite(
    text: &str,
    language: Language,
    placeholder: &str,
    path_start: usize,
    name_end: usize,
) -> (usize, usize, String) {
    let rest = &text[name_end..];
    match language {
        Language::Py => {
            let line = rest.strip_prefix(PY_FRAME_LINE).map(leading_digits);
            match line {
                Some(line) if !line.is_empty() && text[..path_start].ends_with(PY_FRAME_PREFIX) => {
                    return (
                        path_start - PY_FRAME_PREFIX.len(),
                        name_end + PY_FRAME_LINE.len() + line.len(),
                        format!("Line {line}"),
                    );
                }
                _ => {}
            }
        }
        Language::Cpp | Language::Java => {
            if let Some((line, col, consumed)) = location_suffix(rest) {
                let replacement = match col {
                    Some(col) => format!("Line {line}:{col}:"),
                    None => format!("Line {line}:"),
                };
                return (path_start, name_end + consumed, replacement);
            }
        }
    }
    (path_start, name_end, placeholder.to_string())
}

/// Parses `:LINE:` or `:LINE:COL:` right after a file name.
fn location_suffix(rest: &str) -> Option<(&str, Option<&str>, usize)> {
    let after = rest.strip_prefix(':')?;
    let line = leading_digits(after);
    if line.is_empty() {
        return None;
    }
    let after_line = after[line.len()..].strip_prefix(':')?;
    let col = leading_digits(after_line);
    if !col.is_empty() && after_line[col.len()..].starts_with(':') {
        return Some((line, Some(col), line.len() + col.len() + 3));
    }
    Some((line, None, line.len() + 2))
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    &s[..end]
}
