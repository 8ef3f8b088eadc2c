//! Dependency manifest (`requirements.txt`) parsing.
//!
//! The installer inside the image does the real resolution. Parsing here
//! only catches lines it would reject anyway, so a typo fails the build
//! before any container work starts.

use std::path::{Path, PathBuf};

const OPERATORS: &[&str] = &["===", "==", "~=", "!=", ">=", "<=", ">", "<"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    Requirement(Requirement),
    /// Installer options such as `-r base.txt` or `--index-url ...`, kept verbatim.
    Option { line: usize, text: String },
    /// Local paths and URLs, kept verbatim.
    Reference { line: usize, text: String },
}

/// A `name[extras] constraint ; marker --option...` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub line: usize,
    pub name: String,
    pub extras: Vec<String>,
    pub constraint: Option<String>,
    pub marker: Option<String>,
    /// Per-requirement installer options (`--hash=sha256:...`), one token each.
    pub options: Vec<String>,
}

impl Requirement {
    /// Digests pinned with `--hash=<algo>:<hex>` or `--hash <algo>:<hex>`.
    pub fn hashes(&self) -> Vec<&str> {
        let mut hashes = Vec::new();
        let mut tokens = self.options.iter();
        while let Some(token) = tokens.next() {
            if let Some(value) = token.strip_prefix("--hash=") {
                hashes.push(value);
            } else if token == "--hash" {
                if let Some(value) = tokens.next() {
                    hashes.push(value.as_str());
                }
            }
        }
        hashes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    entries: Vec<ManifestEntry>,
}

impl DependencyManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let mut entries = Vec::new();
        let mut pending = String::new();
        let mut pending_start = 0;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            if pending.is_empty() {
                pending_start = line_no;
            }

            let line = strip_comment(raw);
            if let Some(continued) = line.trim_end().strip_suffix('\\') {
                pending.push_str(continued);
                pending.push(' ');
                continue;
            }
            pending.push_str(line);

            let text = pending.trim().to_owned();
            pending.clear();
            if text.is_empty() {
                continue;
            }
            entries.push(parse_entry(pending_start, &text)?);
        }

        let text = pending.trim();
        if !text.is_empty() {
            entries.push(parse_entry(pending_start, text)?);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.iter().filter_map(|entry| match entry {
            ManifestEntry::Requirement(r) => Some(r),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `#` starts a comment at the beginning of a line or after whitespace.
fn strip_comment(line: &str) -> &str {
    let mut prev_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && prev_space {
            return &line[..i];
        }
        prev_space = c.is_whitespace();
    }
    line
}

fn parse_entry(line: usize, text: &str) -> Result<ManifestEntry, ManifestError> {
    if text.starts_with('-') {
        return Ok(ManifestEntry::Option {
            line,
            text: text.to_owned(),
        });
    }
    if text.starts_with('.') || text.starts_with('/') || starts_with_url(text) {
        return Ok(ManifestEntry::Reference {
            line,
            text: text.to_owned(),
        });
    }
    parse_requirement(line, text).map(ManifestEntry::Requirement)
}

fn starts_with_url(text: &str) -> bool {
    text.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn parse_requirement(line: usize, text: &str) -> Result<Requirement, ManifestError> {
    let invalid = |reason: &'static str| ManifestError::InvalidLine {
        line,
        content: text.to_owned(),
        reason,
    };

    let (text, options) = split_options(text);
    validate_options(&options).map_err(invalid)?;

    let (spec, marker) = match text.split_once(';') {
        Some((spec, marker)) => {
            let marker = marker.trim();
            if marker.is_empty() {
                return Err(invalid("empty environment marker"));
            }
            (spec.trim(), Some(marker.to_owned()))
        }
        None => (text, None),
    };

    let name_len = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        .unwrap_or(spec.len());
    let name = &spec[..name_len];
    if !is_valid_name(name) {
        return Err(invalid("invalid distribution name"));
    }

    let mut rest = spec[name_len..].trim_start();
    let mut extras = Vec::new();
    if let Some(after) = rest.strip_prefix('[') {
        let Some((inner, tail)) = after.split_once(']') else {
            return Err(invalid("unclosed extras bracket"));
        };
        for extra in inner.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !is_valid_name(extra) {
                return Err(invalid("invalid extra name"));
            }
            extras.push(extra.to_owned());
        }
        rest = tail.trim_start();
    }

    let constraint = if rest.is_empty() {
        None
    } else if let Some(url) = rest.strip_prefix('@') {
        if url.trim().is_empty() {
            return Err(invalid("missing URL after '@'"));
        }
        Some(rest.to_owned())
    } else {
        let clauses = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        for clause in clauses.split(',') {
            validate_clause(clause.trim()).map_err(invalid)?;
        }
        Some(rest.to_owned())
    };

    Ok(Requirement {
        line,
        name: name.to_owned(),
        extras,
        constraint,
        marker,
        options,
    })
}

/// Splits trailing ` --option` tokens off a requirement line.
fn split_options(text: &str) -> (&str, Vec<String>) {
    let mut prev_space = false;
    for (i, c) in text.char_indices() {
        if prev_space && text[i..].starts_with("--") {
            let options = text[i..].split_whitespace().map(str::to_owned).collect();
            return (text[..i].trim_end(), options);
        }
        prev_space = c.is_whitespace();
    }
    (text, Vec::new())
}

fn validate_options(options: &[String]) -> Result<(), &'static str> {
    for (i, token) in options.iter().enumerate() {
        let missing_value = match token.as_str() {
            "--hash=" => true,
            "--hash" => options.get(i + 1).is_none_or(|next| next.starts_with("--")),
            _ => false,
        };
        if missing_value {
            return Err("missing value for --hash");
        }
    }
    Ok(())
}

fn validate_clause(clause: &str) -> Result<(), &'static str> {
    let Some(op) = OPERATORS.iter().find(|op| clause.starts_with(**op)) else {
        return Err("expected a version operator");
    };
    let version = clause[op.len()..].trim();
    if version.is_empty() {
        return Err("missing version after operator");
    }
    if version.contains(char::is_whitespace) {
        return Err("unexpected whitespace in version");
    }
    Ok(())
}

/// Letters, digits, `.`, `_` and `-`, starting and ending alphanumeric.
fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        }
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read dependency manifest {path}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("line {line}: {reason}: {content:?}")]
    InvalidLine {
        line: usize,
        content: String,
        reason: &'static str,
    },
}
