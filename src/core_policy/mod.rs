use log::debug;

use crate::helpers::unquote;

/// How an incoming path is compared against the configured allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The normalized path must equal an allow-list entry.
    Exact,
    /// The normalized path must begin with an allow-list entry, so sub-paths
    /// under an allowed directory are reachable.
    Prefix,
}

/// A request path that passed the allow-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Remote path as sent to the FTP server, without leading or trailing
    /// separators.
    pub remote_path: String,
    /// A trailing separator on the request marks a directory-listing request.
    pub is_listing: bool,
}

/// The configured set of remote paths the gateway may serve.
///
/// The policy is the security boundary of the gateway: a path it rejects must
/// never reach the FTP layer. Entries are unquoted and normalized once at
/// construction and are read-only afterwards.
#[derive(Debug)]
pub struct PathPolicy {
    entries: Vec<String>,
    mode: MatchMode,
}

impl PathPolicy {
    pub fn new(raw_entries: &[String], mode: MatchMode) -> Self {
        let entries = raw_entries
            .iter()
            .map(|e| unquote(e).trim_matches('/').to_string())
            .collect();
        Self { entries, mode }
    }

    /// Validates and normalizes an incoming HTTP request path.
    ///
    /// Returns `None` when the path is not covered by the allow-list or when
    /// it carries a `..` component. Traversal sequences are rejected outright
    /// rather than rewritten; a rewritten path could still land outside the
    /// allowed area once the FTP server resolves it.
    pub fn resolve(&self, request_path: &str) -> Option<ResolvedPath> {
        let stripped = request_path.strip_prefix('/').unwrap_or(request_path);
        let is_listing = stripped.is_empty() || stripped.ends_with('/');
        let normalized = stripped.trim_end_matches('/');

        if normalized.split('/').any(|component| component == "..") {
            debug!("Rejecting traversal attempt: {}", request_path);
            return None;
        }

        let allowed = self.entries.iter().any(|entry| match self.mode {
            MatchMode::Exact => normalized == entry,
            // A prefix must end at a component boundary; entry "music" covers
            // "music" and "music/x" but not the sibling "musicvideos".
            MatchMode::Prefix => {
                entry.is_empty()
                    || normalized == entry
                    || normalized
                        .strip_prefix(entry.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        });

        if !allowed {
            debug!("Path not in allow-list: {}", request_path);
            return None;
        }

        Some(ResolvedPath {
            remote_path: normalized.to_string(),
            is_listing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(entries: &[&str], mode: MatchMode) -> PathPolicy {
        let entries: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        PathPolicy::new(&entries, mode)
    }

    #[test]
    fn exact_mode_requires_equality() {
        let policy = policy(&["music/song.mp3"], MatchMode::Exact);
        assert!(policy.resolve("/music/song.mp3").is_some());
        assert!(policy.resolve("/music/song.mp3.bak").is_none());
        assert!(policy.resolve("/music").is_none());
    }

    #[test]
    fn prefix_mode_allows_sub_paths() {
        let policy = policy(&["music"], MatchMode::Prefix);
        assert!(policy.resolve("/music").is_some());
        assert!(policy.resolve("/music/album/track01.flac").is_some());
        assert!(policy.resolve("/docs/readme.txt").is_none());
    }

    #[test]
    fn prefix_match_stops_at_component_boundaries() {
        let policy = policy(&["music"], MatchMode::Prefix);
        assert!(policy.resolve("/musicvideos/clip.mp4").is_none());
        assert!(policy.resolve("/music.bak").is_none());
        assert!(policy.resolve("/music/clip.mp4").is_some());

        let root = self::policy(&["/"], MatchMode::Prefix);
        assert!(root.resolve("/anything/goes.txt").is_some());
    }

    #[test]
    fn leading_separator_is_stripped_once() {
        let policy = policy(&["music"], MatchMode::Exact);
        let resolved = policy.resolve("/music").unwrap();
        assert_eq!(resolved.remote_path, "music");
    }

    #[test]
    fn quoted_entries_are_unquoted() {
        let policy = policy(&["\"music\""], MatchMode::Exact);
        assert!(policy.resolve("/music").is_some());
    }

    #[test]
    fn trailing_separator_marks_a_listing() {
        let policy = policy(&["music"], MatchMode::Prefix);
        let listing = policy.resolve("/music/").unwrap();
        assert!(listing.is_listing);
        assert_eq!(listing.remote_path, "music");

        let file = policy.resolve("/music/song.mp3").unwrap();
        assert!(!file.is_listing);
    }

    #[test]
    fn empty_path_collapses_to_root_entry() {
        let policy = policy(&["/"], MatchMode::Prefix);
        let resolved = policy.resolve("/").unwrap();
        assert_eq!(resolved.remote_path, "");
        assert!(resolved.is_listing);
    }

    #[test]
    fn traversal_components_are_rejected() {
        let policy = policy(&["music"], MatchMode::Prefix);
        assert!(policy.resolve("/music/../etc/passwd").is_none());
        assert!(policy.resolve("/music/..").is_none());
    }
}
