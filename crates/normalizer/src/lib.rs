//! Parses a raw command string into primary command + segments, strips
//! shell wrappers, and flags commands the tokenizer could not parse safely
//! (§4.1).

use std::path::{Path, PathBuf};

/// Leading tokens stripped because they wrap, rather than change, the
/// underlying command.
const WRAPPERS: &[&str] = &[
    "sudo", "doas", "env", "command", "builtin", "time", "nice", "ionice", "nohup", "strace",
    "ltrace",
];

/// Shells recognized for `shell -c '<inner>'` unwrapping.
const SHELLS: &[&str] = &["bash", "sh", "zsh", "ksh", "dash"];

/// Result of normalizing one command string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub original: String,
    pub primary: String,
    pub segments: Vec<String>,
    pub is_compound: bool,
    pub has_subshell: bool,
    pub stripped_wrappers: Vec<String>,
    pub parse_error: bool,
}

/// Normalize `input`. `cwd`, when given, is used to resolve `~`, `./`, and
/// `../` path segments in tokens before classification.
#[must_use]
pub fn normalize(input: &str, cwd: Option<&str>) -> NormalizedCommand {
    let original = input.to_string();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return NormalizedCommand {
            original,
            ..Default::default()
        };
    }

    let has_subshell = detect_subshell(trimmed);
    let is_compound = detect_compound_operator(trimmed);
    let raw_segments = split_compound(trimmed);

    let mut segments = Vec::new();
    let mut stripped_wrappers = Vec::new();
    let mut parse_error = false;

    for compound_segment in raw_segments {
        for piped_segment in split_pipe(&compound_segment) {
            let piped_segment = piped_segment.trim();
            if piped_segment.is_empty() {
                continue;
            }
            let (normalized_segments, seg_stripped, seg_parse_error) = normalize_segment(piped_segment, cwd);
            for w in seg_stripped {
                if !stripped_wrappers.contains(&w) {
                    stripped_wrappers.push(w);
                }
            }
            parse_error = parse_error || seg_parse_error;
            segments.extend(normalized_segments);
        }
    }

    let primary = segments.first().cloned().unwrap_or_default();

    NormalizedCommand {
        original,
        primary,
        segments,
        is_compound,
        has_subshell,
        stripped_wrappers,
        parse_error,
    }
}

fn detect_subshell(s: &str) -> bool {
    s.contains("$(") || s.contains('`') || (s.contains('(') && s.contains(')'))
}

fn detect_compound_operator(s: &str) -> bool {
    find_operators(s).next().is_some()
}

/// Yields `(byte_offset, operator_str)` for every compound separator
/// (`;`, `&&`, `||`, `&`) found at the top level of `s`. `&&`/`||` are
/// matched before the single-character `&` so they are never split twice.
fn find_operators(s: &str) -> impl Iterator<Item = (usize, &'static str)> + '_ {
    let bytes = s.as_bytes();
    let mut i = 0;
    std::iter::from_fn(move || {
        while i < bytes.len() {
            let c = bytes[i];
            if c == b';' {
                let at = i;
                i += 1;
                return Some((at, ";"));
            }
            if c == b'&' {
                let at = i;
                if bytes.get(i + 1) == Some(&b'&') {
                    i += 2;
                    return Some((at, "&&"));
                }
                i += 1;
                return Some((at, "&"));
            }
            if c == b'|' && bytes.get(i + 1) == Some(&b'|') {
                let at = i;
                i += 2;
                return Some((at, "||"));
            }
            i += 1;
        }
        None
    })
}

/// Split on compound separators, unless the input contains at least two
/// double-quote characters — a quoted SQL argument must be preserved as a
/// single segment.
fn split_compound(s: &str) -> Vec<String> {
    if s.matches('"').count() >= 2 {
        return vec![s.to_string()];
    }

    let mut segments = Vec::new();
    let mut start = 0;
    for (at, op) in find_operators(s).collect::<Vec<_>>() {
        segments.push(s[start..at].to_string());
        start = at + op.len();
    }
    segments.push(s[start..].to_string());
    segments
}

/// Split a segment on `|`, which by this point can only be a single-pipe
/// (any `||` was already consumed by [`split_compound`]).
fn split_pipe(s: &str) -> Vec<String> {
    s.split('|').map(str::to_string).collect()
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        None => false,
    }
}

/// Tokenize and strip leading wrappers from one segment. A `shell -c
/// '<inner>'` wrapper is unwrapped by recursively normalizing `<inner>`
/// through the top-level [`normalize`] (compound/pipe splitting included)
/// rather than merely re-tokenizing it, so a compound command smuggled
/// through a shell wrapper still gets split into its constituent segments.
/// Returns the resulting segment(s), the wrapper tokens stripped, and
/// whether tokenization failed (unbalanced quotes) anywhere along the way.
fn normalize_segment(segment: &str, cwd: Option<&str>) -> (Vec<String>, Vec<String>, bool) {
    let mut stripped = Vec::new();
    let (mut tokens, mut parse_error) = match shlex::split(segment) {
        Some(tokens) => (tokens, false),
        None => (
            segment.split_whitespace().map(str::to_string).collect(),
            true,
        ),
    };

    loop {
        let Some(first) = tokens.first().cloned() else {
            break;
        };

        if SHELLS.contains(&first.as_str()) && tokens.get(1).map(String::as_str) == Some("-c")
            && tokens.len() >= 3
        {
            stripped.push(format!("{first} -c"));
            let inner = tokens[2].clone();
            let inner_normalized = normalize(&inner, cwd);
            stripped.extend(inner_normalized.stripped_wrappers);
            parse_error = parse_error || inner_normalized.parse_error;
            return (inner_normalized.segments, stripped, parse_error);
        }

        if WRAPPERS.contains(&first.as_str()) {
            stripped.push(first.clone());
            tokens.remove(0);
            if first == "env" {
                while tokens.first().is_some_and(|t| is_env_assignment(t)) {
                    tokens.remove(0);
                }
            }
            continue;
        }

        break;
    }

    let joined = tokens.join(" ");
    let resolved = match cwd {
        Some(cwd) => resolve_segment_paths(&joined, cwd),
        None => joined,
    };
    (vec![resolved], stripped, parse_error)
}

/// Resolve `~`, `./`, and `../` in each whitespace token against `cwd`.
fn resolve_segment_paths(segment: &str, cwd: &str) -> String {
    let home = dirs_next::home_dir();
    segment
        .split(' ')
        .map(|token| resolve_token(token, cwd, home.as_deref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_token(token: &str, cwd: &str, home: Option<&Path>) -> String {
    if let Some(rest) = token.strip_prefix('~') {
        if let Some(home) = home {
            let joined = if rest.is_empty() {
                home.to_path_buf()
            } else {
                home.join(rest.trim_start_matches('/'))
            };
            return joined.to_string_lossy().into_owned();
        }
        return token.to_string();
    }

    if token.starts_with("./") || token.starts_with("../") {
        let joined = Path::new(cwd).join(token);
        return clean_path(&joined).to_string_lossy().into_owned();
    }

    token.to_string()
}

/// Lexically normalize `..` components without touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            },
            std::path::Component::CurDir => {},
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let n = normalize("   ", None);
        assert!(!n.parse_error);
        assert_eq!(n.primary, "");
    }

    #[test]
    fn strips_sudo() {
        let n = normalize("sudo rm -rf /tmp/x", None);
        assert_eq!(n.primary, "rm -rf /tmp/x");
        assert_eq!(n.stripped_wrappers, vec!["sudo".to_string()]);
    }

    #[test]
    fn strips_env_assignments() {
        let n = normalize("env FOO=bar BAZ=1 ls -la", None);
        assert_eq!(n.primary, "ls -la");
        assert!(n.stripped_wrappers.contains(&"env".to_string()));
    }

    #[test]
    fn unwraps_shell_c() {
        let n = normalize("bash -c 'rm -rf /var'", None);
        assert_eq!(n.primary, "rm -rf /var");
        assert!(n.stripped_wrappers.contains(&"bash -c".to_string()));
    }

    #[test]
    fn shell_c_unwrap_splices_compound_inner_into_separate_segments() {
        let (segments, stripped, parse_error) = normalize_segment("bash -c 'echo hi && rm -rf /tmp'", None);
        assert_eq!(segments, vec!["echo hi".to_string(), "rm -rf /tmp".to_string()]);
        assert!(stripped.contains(&"bash -c".to_string()));
        assert!(!parse_error);
    }

    #[test]
    fn compound_split_on_and_and() {
        let n = normalize("ls && rm -rf /etc", None);
        assert!(n.is_compound);
        assert_eq!(n.segments, vec!["ls".to_string(), "rm -rf /etc".to_string()]);
    }

    #[test]
    fn quoted_sql_is_not_split() {
        let n = normalize("psql -c \"DELETE FROM users; DROP TABLE x;\"", None);
        assert_eq!(n.segments.len(), 1);
    }

    #[test]
    fn unbalanced_quotes_sets_parse_error() {
        let n = normalize("echo 'unterminated", None);
        assert!(n.parse_error);
    }

    #[test]
    fn resolves_relative_path_against_cwd() {
        let n = normalize("cat ./a.txt", Some("/work"));
        assert_eq!(n.primary, "cat /work/a.txt");
    }

    #[test]
    fn resolves_parent_dir_against_cwd() {
        let n = normalize("cat ../a.txt", Some("/work/sub"));
        assert_eq!(n.primary, "cat /work/a.txt");
    }

    #[test]
    fn pipe_split() {
        let n = normalize("cat a.txt | grep foo", None);
        assert_eq!(n.segments, vec!["cat a.txt".to_string(), "grep foo".to_string()]);
    }
}
