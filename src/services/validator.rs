// src/services/validator.rs

//! Structural validation of fetched filter lists.
//!
//! The validator is a pure function of a source definition and the
//! fetched bytes: it decodes, normalizes, classifies every line under
//! the source's syntax kind, and decides whether the payload is fit to
//! publish. It never touches the network or the filesystem.
//!
//! The same line classification (`classify_line`) drives the index
//! builder, so the rule count reported here is exactly the number of
//! index rows produced for the written file.

use std::net::IpAddr;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use md5::{Digest, Md5};
use regex::Regex;

use crate::models::{
    ChecksumPolicy, CustomCheck, FetchError, FetchResult, FetchedBody, RejectReason, SourceSpec,
    SyntaxKind, ValidationConfig, ValidationOutcome,
};

static CHECKSUM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*!\s*checksum[\s\-:]+([\w+/=]+).*\n").expect("valid checksum regex")
});

static CHECKSUM_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*!\s*checksum[\s\-:]+[\w+/=]+").expect("valid checksum header regex")
});

static TRAILING_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+\z").expect("valid newline regex"));

/// Classification of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    /// Format header such as `[Adblock Plus 2.0]`
    Header,
    Rule,
}

/// Result of looking for an embedded checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    Absent,
    Valid,
    Mismatch { found: String, expected: String },
}

/// Validator configured with global line limits.
#[derive(Debug, Clone)]
pub struct Validator {
    max_line_length: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_line_length: config.max_line_length.max(1),
        }
    }

    /// Validate a fetch result against its source definition.
    ///
    /// A failed fetch is passed through as `Rejected(Fetch)`. A `304`
    /// carries no body, so callers holding previous content should
    /// validate that content with [`Validator::validate_bytes`] instead.
    pub fn validate(&self, spec: &SourceSpec, fetch: &FetchResult) -> ValidationOutcome {
        match &fetch.body {
            Ok(FetchedBody::Content(bytes)) => self.validate_bytes(spec, bytes),
            Ok(FetchedBody::NotModified) => ValidationOutcome::Rejected(RejectReason::Fetch {
                error: FetchError::Status { status: 304 },
            }),
            Err(error) => ValidationOutcome::Rejected(RejectReason::Fetch {
                error: error.clone(),
            }),
        }
    }

    /// Validate raw bytes against a source definition.
    pub fn validate_bytes(&self, spec: &SourceSpec, bytes: &[u8]) -> ValidationOutcome {
        Self::outcome(self.check(spec, bytes, true))
    }

    /// Re-validate content this tool already published.
    ///
    /// Published content is normalized and carries no checksum header,
    /// so the checksum policy does not apply.
    pub fn validate_published(&self, spec: &SourceSpec, content: &str) -> ValidationOutcome {
        Self::outcome(self.check(spec, content.as_bytes(), false))
    }

    fn outcome(checked: Result<(String, usize), RejectReason>) -> ValidationOutcome {
        match checked {
            Ok((content, rule_count)) => ValidationOutcome::Accepted {
                content,
                rule_count,
            },
            Err(reason) => ValidationOutcome::Rejected(reason),
        }
    }

    fn check(
        &self,
        spec: &SourceSpec,
        bytes: &[u8],
        verify: bool,
    ) -> Result<(String, usize), RejectReason> {
        let text = decode(bytes)?;

        if verify && spec.syntax == SyntaxKind::Adblock && spec.checksum != ChecksumPolicy::Ignore {
            match verify_checksum(&text) {
                ChecksumStatus::Valid => {}
                ChecksumStatus::Absent if spec.checksum == ChecksumPolicy::Required => {
                    return Err(RejectReason::ChecksumMissing);
                }
                ChecksumStatus::Absent => {}
                ChecksumStatus::Mismatch { found, expected } => {
                    return Err(RejectReason::ChecksumMismatch { found, expected });
                }
            }
        }

        let mut content = normalize(&text);
        if spec.syntax == SyntaxKind::Adblock {
            // Normalization invalidates the embedded sum.
            content = strip_checksum(&content);
        }
        reject_html(&content)?;

        let mut rule_count = 0;
        for (index, line) in content.lines().enumerate() {
            if classify_line(spec.syntax, line) != LineKind::Rule {
                continue;
            }
            self.check_rule(spec.syntax, line)
                .map_err(|message| RejectReason::Malformed {
                    line: index + 1,
                    message,
                })?;
            rule_count += 1;
        }

        let required = spec.threshold();
        if rule_count < required {
            return Err(RejectReason::TooFew {
                found: rule_count,
                required,
            });
        }

        if let Some(check) = &spec.check {
            run_custom_check(check, spec.syntax, &content)
                .map_err(|message| RejectReason::CustomCheckFailed { message })?;
        }

        Ok((content, rule_count))
    }

    fn check_rule(&self, syntax: SyntaxKind, line: &str) -> Result<(), String> {
        if line.len() > self.max_line_length {
            return Err(format!(
                "line is {} bytes, limit is {}",
                line.len(),
                self.max_line_length
            ));
        }
        if line.chars().any(|c| c.is_control() && c != '\t') {
            return Err("line contains control characters".into());
        }

        match syntax {
            SyntaxKind::Hosts => check_hosts_rule(line),
            SyntaxKind::Domains => check_domain_rule(line),
            SyntaxKind::Adblock | SyntaxKind::Custom => Ok(()),
        }
    }
}

/// Decode bytes as UTF-8, dropping a leading byte order mark.
fn decode(bytes: &[u8]) -> Result<String, RejectReason> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8(bytes.to_vec()).map_err(|e| RejectReason::Encoding {
        message: format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
    })?;
    if text.contains('\0') {
        return Err(RejectReason::Encoding {
            message: "content contains NUL bytes".into(),
        });
    }
    Ok(text)
}

/// Normalize line endings and trailing whitespace.
///
/// Output uses `\n` line endings, has no trailing whitespace on any
/// line, no trailing blank lines, and ends with exactly one newline
/// unless it is empty.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(unified.len() + 1);
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Classify a line under a syntax kind.
pub fn classify_line(syntax: SyntaxKind, line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    match syntax {
        SyntaxKind::Adblock => {
            if trimmed.starts_with('!') || trimmed == "#" || trimmed.starts_with("# ") {
                LineKind::Comment
            } else if trimmed.starts_with('[') && !trimmed.starts_with("[$") && trimmed.ends_with(']')
            {
                LineKind::Header
            } else {
                LineKind::Rule
            }
        }
        SyntaxKind::Hosts => {
            if trimmed.starts_with('#') {
                LineKind::Comment
            } else {
                LineKind::Rule
            }
        }
        SyntaxKind::Domains | SyntaxKind::Custom => {
            if trimmed.starts_with('#') || trimmed.starts_with('!') {
                LineKind::Comment
            } else {
                LineKind::Rule
            }
        }
    }
}

/// Rule lines of normalized content as `(1-based line number, line)`.
pub fn rule_lines(syntax: SyntaxKind, content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(move |(_, line)| classify_line(syntax, line) == LineKind::Rule)
        .map(|(index, line)| (index + 1, line))
}

/// Number of rule lines in content.
pub fn count_rules(syntax: SyntaxKind, content: &str) -> usize {
    rule_lines(syntax, content).count()
}

/// Verify an embedded `! Checksum:` header.
///
/// The checksum is the unpadded base64 MD5 of the text with the
/// checksum line removed, CR characters dropped and trailing newlines
/// collapsed to one.
pub fn verify_checksum(text: &str) -> ChecksumStatus {
    let Some(captures) = CHECKSUM_LINE.captures(text) else {
        return ChecksumStatus::Absent;
    };
    let found = captures[1].to_string();

    let body = CHECKSUM_LINE.replace(text, "").replace('\r', "");
    let body = TRAILING_NEWLINES.replace(&body, "\n");
    let expected = STANDARD_NO_PAD.encode(Md5::digest(body.as_bytes()));

    if found.trim_end_matches('=') == expected {
        ChecksumStatus::Valid
    } else {
        ChecksumStatus::Mismatch { found, expected }
    }
}

/// Drop `! Checksum:` header lines from normalized content.
pub fn strip_checksum(content: &str) -> String {
    if !content.lines().any(|l| CHECKSUM_HEADER.is_match(l)) {
        return content.to_string();
    }
    let mut out = String::with_capacity(content.len());
    for line in content.lines().filter(|l| !CHECKSUM_HEADER.is_match(l)) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn reject_html(content: &str) -> Result<(), RejectReason> {
    let Some((index, first)) = content
        .lines()
        .enumerate()
        .find(|(_, line)| !line.trim().is_empty())
    else {
        return Ok(());
    };

    let lower = first.trim_start().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") || lower.starts_with("<?xml")
    {
        return Err(RejectReason::Malformed {
            line: index + 1,
            message: "payload is an HTML/XML document".into(),
        });
    }
    Ok(())
}

fn check_hosts_rule(line: &str) -> Result<(), String> {
    let without_comment = line.split('#').next().unwrap_or("");
    let mut fields = without_comment.split_whitespace();

    let address = fields.next().ok_or("empty hosts entry")?;
    let address = address.split('%').next().unwrap_or(address);
    address
        .parse::<IpAddr>()
        .map_err(|_| format!("'{address}' is not an IP address"))?;

    let mut hosts = 0;
    for host in fields {
        if !is_valid_hostname(host) {
            return Err(format!("'{host}' is not a valid hostname"));
        }
        hosts += 1;
    }
    if hosts == 0 {
        return Err("hosts entry has no hostname".into());
    }
    Ok(())
}

fn check_domain_rule(line: &str) -> Result<(), String> {
    let domain = line.trim();
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    if is_valid_hostname(domain) {
        Ok(())
    } else {
        Err(format!("'{domain}' is not a valid domain"))
    }
}

/// Permissive hostname check: dot-separated non-empty labels of
/// alphanumerics, `-` and `_`.
fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        })
}

fn run_custom_check(check: &CustomCheck, syntax: SyntaxKind, content: &str) -> Result<(), String> {
    match check {
        CustomCheck::ContainsLine { line } => {
            let wanted = line.trim();
            if content.lines().any(|l| l.trim() == wanted) {
                Ok(())
            } else {
                Err(format!("missing required line '{wanted}'"))
            }
        }
        CustomCheck::ContainsPattern { pattern } => {
            let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            if content.lines().any(|l| regex.is_match(l)) {
                Ok(())
            } else {
                Err(format!("no line matches /{pattern}/"))
            }
        }
        CustomCheck::HeaderField { name, value } => {
            let found = content
                .lines()
                .filter(|l| classify_line(syntax, l) == LineKind::Comment)
                .filter_map(header_field)
                .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()));

            match (found, value) {
                (None, _) => Err(format!("missing header '{name}'")),
                (Some((_, actual)), Some(expected)) if !actual.contains(expected.as_str()) => Err(
                    format!("header '{name}' is '{actual}', expected to contain '{expected}'"),
                ),
                _ => Ok(()),
            }
        }
    }
}

/// Split a `! Key: value` / `# Key: value` comment into its parts.
fn header_field(line: &str) -> Option<(&str, &str)> {
    let body = line.trim().trim_start_matches(['!', '#']).trim();
    let (key, value) = body.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.split_whitespace().count() > 3 {
        return None;
    }
    Some((key, value.trim()))
}
