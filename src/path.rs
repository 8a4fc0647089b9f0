//! Path resolution and canonicalization (§4.1).

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Resolves `input` against `cwd`.
///
/// An absolute `input` (starting with `/`) is returned as-is. A relative
/// `input` is joined onto `cwd`. Neither form is normalized here — callers
/// run [`normalize`] on the result.
pub fn resolve_input(cwd: &str, input: &str) -> String {
    if input.starts_with('/') {
        String::from(input)
    } else if cwd == "/" {
        format!("/{input}")
    } else {
        format!("{cwd}/{input}")
    }
}

/// Collapses `path` to canonical form: single `/` separators, no `.` or
/// `..` components, no trailing separator (except the bare root).
///
/// This is a left-to-right single pass over path components. Conceptually
/// it walks the same nine states the reference source's in-place state
/// machine does (`INITIAL`/`FIELD_START`/`IN_FIELD` for a plain component,
/// `SEPARATOR`/`SEEN_SEPARATOR` for collapsing a run of slashes,
/// `DOT`/`SEEN_DOT` and `DOTDOT`/`SEEN_DOTDOT` for deciding whether a
/// component starting with one or two dots is special or just happens to
/// start that way) — expressed here as a component scan over an owned
/// output buffer rather than mutating the input in place, which has no
/// externally observable difference.
pub fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            field => components.push(field),
        }
    }

    if components.is_empty() {
        String::from("/")
    } else {
        let mut out = String::with_capacity(path.len());
        for component in components {
            out.push('/');
            out.push_str(component);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_table() {
        let cases: &[(&str, &str)] = &[
            ("", "/"),
            ("/", "/"),
            ("///", "/"),
            ("//a//b/", "/a/b"),
            ("/a/./b", "/a/b"),
            ("/a/../b", "/b"),
            ("/a/./b/../c", "/a/c"),
            ("/a/b/../../..", "/"),
            ("/a//b", "/a/b"),
            ("/..", "/"),
            ("/.hidden", "/.hidden"),
            ("/..name", "/..name"),
            ("/.hidden/..x", "/.hidden/..x"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(input), *expected, "normalize({input:?})");
        }
    }

    #[test]
    fn resolve_input_absolute_is_untouched() {
        assert_eq!(resolve_input("/x", "/a/b"), "/a/b");
    }

    #[test]
    fn resolve_input_relative_joins_cwd() {
        assert_eq!(normalize(&resolve_input("/x", "a/b")), "/x/a/b");
        assert_eq!(normalize(&resolve_input("/", "a/b")), "/a/b");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "", "/", "///", "/a/./b/../c", "/a/b/../../..", "/a//b", "/.hidden/..x",
            "/weird//.././a",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize(normalize({input:?}))");
        }
    }

    #[test]
    fn normalize_of_canonical_path_is_fixed_point() {
        let canonical = ["/", "/a", "/a/b", "/.hidden", "/..name"];
        for path in canonical {
            assert_eq!(normalize(path), path);
        }
    }
}
