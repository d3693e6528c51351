//! POSIX path helpers for paths inside remote containers.
//!
//! Remote paths are never touched locally, so they are handled as strings
//! with forward slashes regardless of the host platform.

/// Whether a remote path is absolute.
pub fn is_remote_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Lexically clean a remote path: collapse `//`, drop `.`, resolve `..`.
///
/// An empty result becomes `.` for relative paths and `/` for absolute ones.
pub fn clean_remote(path: &str) -> String {
    let absolute = is_remote_absolute(path);
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join remote path elements and clean the result, ignoring empty elements.
pub fn join_remote(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (true, true) => String::new(),
        (true, false) => clean_remote(rel),
        (false, true) => clean_remote(base),
        (false, false) => clean_remote(&format!("{base}/{rel}")),
    }
}

/// Relative path from `base` down to `target`, or `None` when `target` is
/// not at or beneath `base`.
pub fn remote_relative(base: &str, target: &str) -> Option<String> {
    let base = clean_remote(base);
    let target = clean_remote(target);
    if base == target {
        return Some(".".to_string());
    }
    if is_remote_absolute(&base) != is_remote_absolute(&target) {
        return None;
    }
    let prefix = if base == "/" {
        "/".to_string()
    } else if base == "." {
        return (!target.starts_with("..")).then_some(target);
    } else {
        format!("{base}/")
    };
    target.strip_prefix(&prefix).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_segments() {
        assert_eq!(clean_remote("/app/./src//lib/../main"), "/app/src/main");
        assert_eq!(clean_remote("/.."), "/");
        assert_eq!(clean_remote("./"), ".");
        assert_eq!(clean_remote("../x"), "../x");
    }

    #[test]
    fn join_ignores_empty_elements() {
        assert_eq!(join_remote("/app", "src"), "/app/src");
        assert_eq!(join_remote("/app", "."), "/app");
        assert_eq!(join_remote("", "src"), "src");
        assert_eq!(join_remote("/app", ""), "/app");
    }

    #[test]
    fn relative_only_descends() {
        assert_eq!(remote_relative("/app", "/app/src/x").as_deref(), Some("src/x"));
        assert_eq!(remote_relative("/app", "/app").as_deref(), Some("."));
        assert_eq!(remote_relative("/", "/srv").as_deref(), Some("srv"));
        assert_eq!(remote_relative("/app", "/application"), None);
        assert_eq!(remote_relative("/app", "/other"), None);
        assert_eq!(remote_relative("app", "/app/x"), None);
    }
}
