//! Output layout helpers.
//!
//! ```text
//! <out_root>/
//!   <project-slug>/
//!     <target>/        per-line working directory handed to methods
//!     assembled/       output of `reelforge assemble`
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\-_.]+").expect("static regex is valid"));
static REPEATED_DASHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-{2,}").expect("static regex is valid"));

/// Reduce an arbitrary string to a filesystem-safe slug.
///
/// Accents are folded (`é` → `e`), anything outside `[a-z0-9-_.]` becomes a
/// dash, runs of dashes collapse and leading/trailing dashes and dots are
/// trimmed. An input that reduces to nothing yields `"item"`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .trim()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    let replaced = UNSAFE_CHARS.replace_all(&folded, "-");
    let collapsed = REPEATED_DASHES.replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `name` can be used verbatim as a file stem
#[must_use]
pub fn is_filesystem_safe(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Leading character of derived target names. Ids starting with it are
/// never used verbatim, so a derived target cannot equal another line's id.
const DERIVED_TARGET_PREFIX: char = '_';

/// Target name for a script line: the line id when it is already safe,
/// otherwise `_<position>_<slug>` with a zero-padded 1-based position.
///
/// Distinct lines of one script always get distinct targets.
#[must_use]
pub fn target_name(line_id: &str, position: usize) -> String {
    if is_filesystem_safe(line_id) && !line_id.starts_with(DERIVED_TARGET_PREFIX) {
        line_id.to_string()
    } else {
        format!("{DERIVED_TARGET_PREFIX}{:03}_{}", position + 1, slugify(line_id))
    }
}

/// Output directory of a project under the output root
#[must_use]
pub fn project_dir(out_root: &Utf8Path, project: &str) -> Utf8PathBuf {
    out_root.join(slugify(project))
}

/// Working directory for one line of a project
#[must_use]
pub fn line_workdir(out_root: &Utf8Path, project: &str, target: &str) -> Utf8PathBuf {
    project_dir(out_root, project).join(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  MH370 -- Disappearance!  "), "mh370-disappearance");
        assert_eq!(slugify("Café Déjà Vu"), "cafe-deja-vu");
        assert_eq!(slugify("text_to_video"), "text_to_video");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), "item");
        assert_eq!(slugify("晚安"), "item");
        assert_eq!(slugify("..."), "item");
    }

    #[test]
    fn test_target_name() {
        assert_eq!(target_name("L1", 0), "L1");
        assert_eq!(target_name("scene 2", 1), "_002_scene-2");
        assert_eq!(target_name("../escape", 4), "_005_escape");
        assert_eq!(target_name(".hidden", 0), "_001_hidden");
        assert_eq!(target_name("_private", 2), "_003__private");
    }

    #[test]
    fn test_safe_id_cannot_take_derived_target() {
        // "002_x" is used verbatim; "X!" at position 2 is derived
        assert_eq!(target_name("002_x", 0), "002_x");
        assert_eq!(target_name("X!", 1), "_002_x");
        // An id spelled like a derived target is derived itself
        assert_eq!(target_name("_002_x", 0), "_001__002_x");
    }

    #[test]
    fn test_line_workdir_layout() {
        let dir = line_workdir(Utf8Path::new("out"), "My Project", "L3");
        assert_eq!(dir, Utf8PathBuf::from("out/my-project/L3"));
    }

    proptest! {
        #[test]
        fn prop_slug_is_filesystem_safe(input in ".{0,40}") {
            let slug = slugify(&input);
            prop_assert!(is_filesystem_safe(&slug), "unsafe slug {:?} from {:?}", slug, input);
        }

        #[test]
        fn prop_target_name_is_filesystem_safe(id in ".{0,24}", position in 0usize..500) {
            prop_assert!(is_filesystem_safe(&target_name(&id, position)));
        }

        #[test]
        fn prop_distinct_lines_get_distinct_targets(
            a in "[A-Za-z0-9_!. -]{1,8}",
            b in "[A-Za-z0-9_!. -]{1,8}",
            pa in 0usize..1200,
            pb in 0usize..1200,
        ) {
            prop_assume!(a != b && pa != pb);
            prop_assert_ne!(target_name(&a, pa), target_name(&b, pb));
        }
    }
}
