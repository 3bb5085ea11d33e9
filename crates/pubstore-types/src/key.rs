//! Object-key construction.
//!
//! Remote keys are flat strings. Logical paths are slash-separated and get
//! joined onto the backend prefix here, so no platform path separator ever
//! reaches the store. Joining follows the usual lexical clean rules:
//! - empty and `.` segments are dropped
//! - `..` removes the previous segment (and is dropped at the root)
//! - the result never starts or ends with `/` and never contains `//`

/// Join logical path parts into a single object key.
///
/// ```
/// use pubstore_types::join_key;
///
/// assert_eq!(join_key(&["prefix", "dists/stable", "Release"]), "prefix/dists/stable/Release");
/// assert_eq!(join_key(&["", "pool/"]), "pool");
/// assert_eq!(join_key(&["a/./b", "../c"]), "a/c");
/// assert_eq!(join_key(&["", ""]), "");
/// ```
pub fn join_key(parts: &[&str]) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in parts {
        for segment in part.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
    }
    segments.join("/")
}

/// The listing prefix for a directory key: `key/`, or empty for the root.
pub fn dir_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Strip a directory prefix produced by [`dir_prefix`] from an object name.
///
/// Returns `None` when the name lies outside that directory.
pub fn strip_dir_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn joins_prefix_and_path() {
        assert_eq!(join_key(&["repo", "pool/main/a/apt"]), "repo/pool/main/a/apt");
    }

    #[test]
    fn empty_prefix_is_transparent() {
        assert_eq!(join_key(&["", "dists/stable"]), "dists/stable");
        assert_eq!(join_key(&["repo", ""]), "repo");
    }

    #[test]
    fn redundant_slashes_collapse() {
        assert_eq!(join_key(&["/repo/", "//dists//stable/"]), "repo/dists/stable");
    }

    #[test]
    fn parent_segments_are_resolved() {
        assert_eq!(join_key(&["repo", "a/../b"]), "repo/b");
        assert_eq!(join_key(&["..", "x"]), "x");
    }

    #[test]
    fn backslashes_are_not_separators() {
        assert_eq!(join_key(&["repo", "a\\b"]), "repo/a\\b");
    }

    #[test]
    fn dir_prefix_of_root_is_empty() {
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("repo/dists"), "repo/dists/");
    }

    #[test]
    fn strip_dir_prefix_rejects_siblings() {
        let prefix = dir_prefix("repo/a");
        assert_eq!(strip_dir_prefix("repo/a/x", &prefix), Some("x"));
        assert_eq!(strip_dir_prefix("repo/a2/x", &prefix), None);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9._/-]{0,12}"
    }

    proptest! {
        #[test]
        fn joined_keys_are_clean(parts in proptest::collection::vec(segment(), 0..6)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let key = join_key(&refs);
            prop_assert!(!key.contains("//"));
            prop_assert!(!key.starts_with('/'));
            prop_assert!(!key.ends_with('/'));
            prop_assert!(key.split('/').all(|s| s != "." && s != ".."));
        }

        #[test]
        fn prefix_strip_recovers_relative_name(
            prefix in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
            name in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
        ) {
            let dir = dir_prefix(&prefix);
            let key = join_key(&[&prefix, &name]);
            prop_assert_eq!(strip_dir_prefix(&key, &dir), Some(name.as_str()));
        }

        #[test]
        fn joining_is_idempotent(parts in proptest::collection::vec(segment(), 0..6)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let once = join_key(&refs);
            prop_assert_eq!(join_key(&[&once]), once.clone());
        }
    }
}
