//! Output file naming.
//!
//! Deliverables are named `"{title} [{id}].{ext}"` and never overwrite an
//! existing file: a ` (n)` suffix is added until the name is free. The
//! existence check is not atomic with the later move; two writers racing on
//! the same title may pick the same name.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Default cap on sanitized title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Substituted when a title sanitizes to nothing.
pub const UNTITLED: &str = "untitled";

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn strip_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// Make a title safe to use as a file name.
///
/// Path separators and pipes become `-`, a colon becomes ` -`, double quotes
/// become single quotes; `* ? < >` and control characters are removed.
/// Whitespace runs collapse to one space, leading/trailing whitespace and
/// dots are stripped and the result is capped at `max_len` characters.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | '|' => out.push('-'),
            ':' => out.push_str(" -"),
            '"' => out.push('\''),
            '*' | '?' | '<' | '>' => {}
            '\n' | '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    let collapsed = whitespace_run().replace_all(&out, " ");
    let mut name = strip_edges(&collapsed).to_string();

    if name.chars().count() > max_len {
        let truncated: String = name.chars().take(max_len).collect();
        name = strip_edges(&truncated).to_string();
    }

    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name
    }
}

/// `"{title} [{id}].{ext}"`, with the title sanitized.
pub fn output_file_name(title: &str, id: &str, ext: &str) -> String {
    format!("{} [{}].{}", sanitize_filename(title, MAX_TITLE_LEN), id, ext)
}

/// First free path in `dir` for this title and id.
///
/// Tries `"{title} [{id}].{ext}"`, then `"{title} [{id}] (1).{ext}"`,
/// `(2)`, ... until nothing exists at the candidate path.
pub fn resolve_output_path(title: &str, id: &str, ext: &str, dir: &Path) -> PathBuf {
    let title = sanitize_filename(title, MAX_TITLE_LEN);

    let candidate = dir.join(format!("{} [{}].{}", title, id, ext));
    if !candidate.exists() {
        return candidate;
    }

    let mut n: u64 = 1;
    loop {
        let candidate = dir.join(format!("{} [{}] ({}).{}", title, id, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

    #[test]
    fn test_sanitize_replacements() {
        assert_eq!(sanitize_filename("AC/DC: Live", MAX_TITLE_LEN), "AC-DC - Live");
        assert_eq!(sanitize_filename("say \"hi\"", MAX_TITLE_LEN), "say 'hi'");
        assert_eq!(sanitize_filename("what? <really>*", MAX_TITLE_LEN), "what really");
        assert_eq!(sanitize_filename("a|b\\c", MAX_TITLE_LEN), "a-b-c");
        assert_eq!(sanitize_filename("line\none\ttab\r", MAX_TITLE_LEN), "line one tab");
    }

    #[test]
    fn test_sanitize_edges_and_whitespace() {
        assert_eq!(sanitize_filename("  ..hidden title..  ", MAX_TITLE_LEN), "hidden title");
        assert_eq!(sanitize_filename("a    b", MAX_TITLE_LEN), "a b");
        assert_eq!(sanitize_filename(" . ", MAX_TITLE_LEN), UNTITLED);
        assert_eq!(sanitize_filename("???", MAX_TITLE_LEN), UNTITLED);
    }

    #[test]
    fn test_sanitize_property() {
        let inputs = [
            "Normal title",
            " :: weird // name ::. ",
            "Ünïcödé title | part 2?",
            "\u{0}\u{7}control\u{1b}",
            &"x".repeat(500),
            &"é ".repeat(300),
        ];
        for input in inputs {
            let out = sanitize_filename(input, MAX_TITLE_LEN);
            assert!(!out.contains(RESERVED), "{out:?}");
            assert!(out.chars().count() <= MAX_TITLE_LEN, "{out:?}");
            assert_eq!(out, strip_edges(&out), "{out:?}");
            assert!(!out.is_empty());
        }
    }

    #[test]
    fn test_truncation_restrips() {
        let title = format!("{}. tail", "a".repeat(9));
        assert_eq!(sanitize_filename(&title, 10), "aaaaaaaaa");
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("My: Video", "abc", "mkv"), "My - Video [abc].mkv");
    }

    #[test]
    fn test_resolve_output_path_collisions() {
        let dir = TempDir::new().unwrap();

        let first = resolve_output_path("Title", "id1", "mkv", dir.path());
        assert_eq!(first, dir.path().join("Title [id1].mkv"));
        assert_eq!(resolve_output_path("Title", "id1", "mkv", dir.path()), first);

        std::fs::write(&first, b"x").unwrap();
        let second = resolve_output_path("Title", "id1", "mkv", dir.path());
        assert_eq!(second, dir.path().join("Title [id1] (1).mkv"));

        std::fs::write(&second, b"x").unwrap();
        assert_eq!(
            resolve_output_path("Title", "id1", "mkv", dir.path()),
            dir.path().join("Title [id1] (2).mkv")
        );
    }
}
