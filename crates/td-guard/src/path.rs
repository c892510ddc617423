//! Strict path validation to prevent directory traversal and unsafe file names.
//!
//! Every externally influenced path string (import/export locations, report
//! file names, backup targets) MUST pass through these validators before it is
//! joined onto a directory or handed to the filesystem. Traversal is checked on
//! the raw string, on every percent-decoded form, and again after lexical
//! normalization -- checking only the canonical form is insufficient because
//! encoded sequences decode into traversal sequences.

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound accepted for a whole path string.
const MAX_PATH_LEN: usize = 4096;

/// Upper bound accepted for a single file name.
const MAX_FILE_NAME_LEN: usize = 255;

/// Name substituted when sanitization strips a candidate down to nothing.
const REPLACEMENT_NAME: &str = "unnamed_file";

/// Bound on iterative percent-decoding, enough to unmask double and triple
/// encoded traversal attempts without looping forever on pathological input.
const MAX_DECODE_DEPTH: usize = 4;

/// Characters that are illegal in file names on at least one supported host
/// filesystem. TeamDesk data directories sync across machines, so these are
/// rejected everywhere.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode one layer of `%XX` escapes, leaving malformed escapes untouched.
fn percent_decode_once(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// True if the string carries a `..` traversal sequence in any spelling.
fn contains_traversal(s: &str) -> bool {
    s.contains("../")
        || s.contains("..\\")
        || s.split(['/', '\\']).any(|segment| segment == "..")
}

/// True if the string, in its raw form or after any number of percent-decode
/// passes, contains traversal or smuggled control characters.
fn rejects_encoded_forms(path: &str) -> bool {
    let mut current = path.to_owned();
    for _ in 0..MAX_DECODE_DEPTH {
        if contains_traversal(&current) || current.chars().any(char::is_control) {
            return true;
        }
        let decoded = percent_decode_once(&current);
        if decoded == current {
            return false;
        }
        current = decoded;
    }
    // Decode depth exhausted without reaching a fixpoint: treat as hostile.
    true
}

/// Validate an untrusted path string.
///
/// Rejects: empty input, oversized input, control characters, characters
/// illegal on the host filesystems, and `..` traversal in raw or
/// percent-encoded form (including double encoding).
pub fn validate(path: &str) -> bool {
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return false;
    }
    if path.chars().any(|c| ILLEGAL_CHARS.contains(&c)) {
        return false;
    }
    if rejects_encoded_forms(path) {
        warn!(input_len = path.len(), "Rejected path with traversal or control sequence");
        return false;
    }
    true
}

/// Validate a single file name (no directory part).
///
/// In addition to [`validate`], rejects separators, names that start or end
/// with a dot, reserved Windows device names (with or without an extension),
/// and blank or oversized names.
pub fn validate_file_name(name: &str) -> bool {
    if name.trim().is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return false;
    }
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    if name.starts_with('.') || name.ends_with('.') {
        return false;
    }
    if is_reserved_device_name(name) {
        return false;
    }
    validate(name)
}

/// Reserved device names on Windows-style filesystems, matched
/// case-insensitively against the portion before the first dot.
fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    let upper = stem.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            upper.len() == 4
                && (upper.starts_with("COM") || upper.starts_with("LPT"))
                && matches!(upper.as_bytes()[3], b'1'..=b'9')
        }
    }
}

/// Strip a path string of characters that would fail [`validate`].
///
/// Traversal-bearing input is never repaired: the result would still express
/// intent to escape, so the function refuses with `None` instead. Other
/// violations are stripped; if nothing safe remains, a fixed placeholder name
/// is returned.
pub fn sanitize(path: &str) -> Option<String> {
    if rejects_encoded_forms(path) {
        warn!("Refusing to sanitize traversal-bearing input");
        return None;
    }

    let cleaned: String = path
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();

    if cleaned.is_empty() {
        debug!("Sanitization left nothing, substituting placeholder name");
        Some(REPLACEMENT_NAME.to_owned())
    } else {
        Some(cleaned.to_owned())
    }
}

/// Resolve `.` segments and collapse `..` lexically; `None` when a `..`
/// would climb above the start of the path.
fn normalize_lexical(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    Some(out)
}

/// Final containment gate: does `path` resolve strictly inside `base`?
///
/// Both sides are absolutized and lexically normalized before the prefix
/// check. This runs independently of the syntactic checks in [`validate`] so
/// a validator bypass still cannot place a file outside its base directory.
pub fn is_within_base(path: impl AsRef<Path>, base: impl AsRef<Path>) -> bool {
    let Ok(abs_path) = std::path::absolute(path.as_ref()) else {
        return false;
    };
    let Ok(abs_base) = std::path::absolute(base.as_ref()) else {
        return false;
    };
    let (Some(normalized), Some(normalized_base)) =
        (normalize_lexical(&abs_path), normalize_lexical(&abs_base))
    else {
        return false;
    };
    normalized != normalized_base && normalized.starts_with(&normalized_base)
}

/// Outcome of one validation pass over an untrusted path string.
///
/// A `ValidatedPath` that reports valid never contains a `..` segment after
/// normalization and, when a base was supplied, never resolves outside it.
#[derive(Debug, Clone)]
pub struct ValidatedPath {
    raw: String,
    normalized: Option<PathBuf>,
    valid: bool,
}

impl ValidatedPath {
    /// Run the full validation pipeline over `raw`, optionally enforcing
    /// containment in `base`.
    pub fn evaluate(raw: &str, base: Option<&Path>) -> Self {
        let valid = validate(raw) && base.map_or(true, |b| is_within_base(Path::new(raw), b));
        let normalized = if valid {
            std::path::absolute(Path::new(raw))
                .ok()
                .and_then(|p| normalize_lexical(&p))
        } else {
            None
        };
        Self {
            raw: raw.to_owned(),
            normalized,
            valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Absolute, normalized form. Present only when the path is valid.
    pub fn normalized(&self) -> Option<&Path> {
        self.normalized.as_deref()
    }
}

/// The fixed directory roots TeamDesk is allowed to write under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDir {
    Data,
    Reports,
    Logs,
    Backups,
}

impl RootDir {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Reports => "reports",
            Self::Logs => "logs",
            Self::Backups => "backups",
        }
    }
}

/// Builds output paths under the application home, one whitelisted root at a
/// time. Every segment must pass [`validate_file_name`] and the assembled
/// path is re-verified with [`is_within_base`]; a single failing segment
/// aborts the whole build.
#[derive(Debug, Clone)]
pub struct SafePathBuilder {
    home: PathBuf,
}

impl SafePathBuilder {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn root(&self, root: RootDir) -> PathBuf {
        self.home.join(root.dir_name())
    }

    /// Join validated segments under a whitelisted root.
    ///
    /// Returns `None` (and no partial path) as soon as any segment fails
    /// validation or the final containment check does not hold.
    pub fn build(&self, root: RootDir, segments: &[&str]) -> Option<PathBuf> {
        if segments.is_empty() {
            return None;
        }

        let base = self.root(root);
        let mut path = base.clone();
        for segment in segments {
            if !validate_file_name(segment) {
                warn!(root = root.dir_name(), "Rejected unsafe path segment");
                return None;
            }
            path.push(segment);
        }

        if !is_within_base(&path, &base) {
            warn!(root = root.dir_name(), "Assembled path escaped its root");
            return None;
        }

        debug!(path = %path.display(), "Built safe output path");
        Some(path)
    }
}
