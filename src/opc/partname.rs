//! Part-name path utilities.
//!
//! Part names are normalized POSIX-style paths without a leading slash
//! (e.g. `ppt/slides/slide1.xml`). The empty string names the package
//! itself, whose relationship sidecar lives at `_rels/.rels`. These
//! functions are pure; the package map is the only owner of part state.

/// Strip an optional leading slash from a part name.
pub fn normalize(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// The absolute form of a part name, as used by content-type overrides.
pub fn absolute(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Get the directory portion of a part name.
///
/// For example, `ppt/slides` for `ppt/slides/slide1.xml`; empty for a
/// top-level part.
pub fn dirname(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[..pos],
        None => "",
    }
}

/// Get the filename portion of a part name.
pub fn basename(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Get the extension of a part name, without the leading period.
///
/// Empty when the filename has no period.
pub fn ext(name: &str) -> &str {
    let filename = basename(name);
    match filename.rfind('.') {
        Some(pos) => &filename[pos + 1..],
        None => "",
    }
}

/// The relationship sidecar name for a source part.
///
/// For part `P` this is `dirname(P)/_rels/basename(P).rels`; for the
/// package itself (empty name), `_rels/.rels`.
pub fn rels_part_for(source_part: &str) -> String {
    let source = normalize(source_part);
    if source.is_empty() {
        return "_rels/.rels".to_string();
    }
    let dir = dirname(source);
    if dir.is_empty() {
        format!("_rels/{}.rels", basename(source))
    } else {
        format!("{}/_rels/{}.rels", dir, basename(source))
    }
}

/// The source part a relationship sidecar belongs to.
///
/// Inverse of [`rels_part_for`]; `None` when the name is not a sidecar.
pub fn source_part_for(rels_part: &str) -> Option<String> {
    let rels = normalize(rels_part);
    if rels == "_rels/.rels" {
        return Some(String::new());
    }
    let base = basename(rels).strip_suffix(".rels")?;
    let rels_dir = dirname(rels);
    let source_dir = dirname(rels_dir);
    if basename(rels_dir) != "_rels" {
        return None;
    }
    if source_dir.is_empty() {
        Some(base.to_string())
    } else {
        Some(format!("{}/{}", source_dir, base))
    }
}

/// Resolve a relationship target against its source part's directory.
///
/// Absolute targets (leading slash) have the slash stripped; relative
/// targets are joined onto the source directory with `.` and `..`
/// collapsed. Never called for External relationships.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let base_dir = dirname(normalize(source_part));
    if base_dir.is_empty() {
        normalize_path(target)
    } else {
        normalize_path(&format!("{}/{}", base_dir, target))
    }
}

/// The relative reference from a source part to a target part, suitable
/// for use as a relationship `Target` attribute.
///
/// For example, `../slideLayouts/slideLayout1.xml` from
/// `ppt/slides/slide1.xml` to `ppt/slideLayouts/slideLayout1.xml`.
pub fn relative_ref(source_part: &str, target_part: &str) -> String {
    let base_dir = dirname(normalize(source_part));
    let target = normalize(target_part);

    let from_parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = String::new();
    for _ in common..from_parts.len() {
        result.push_str("../");
    }
    for (i, part) in to_parts.iter().enumerate().skip(common) {
        if i > common {
            result.push('/');
        }
        result.push_str(part);
    }
    result
}

/// Get the numeric suffix of a part's filename stem, or `None` for
/// singleton names.
///
/// For example, `Some(21)` for `ppt/slides/slide21.xml` and `None` for
/// `ppt/presentation.xml`.
pub fn numeric_suffix(name: &str) -> Option<u32> {
    let filename = basename(name);
    let stem = match filename.rfind('.') {
        Some(pos) => &filename[..pos],
        None => filename,
    };
    let digits_at = stem.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = stem.split_at(digits_at);
    if prefix.is_empty() || digits.is_empty() {
        return None;
    }
    atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()
}

/// Collapse `.` and `..` segments in a relative POSIX path.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/ppt/slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(normalize("ppt/slides/slide1.xml"), "ppt/slides/slide1.xml");
    }

    #[test]
    fn test_rels_part_for() {
        assert_eq!(rels_part_for(""), "_rels/.rels");
        assert_eq!(
            rels_part_for("ppt/presentation.xml"),
            "ppt/_rels/presentation.xml.rels"
        );
        assert_eq!(
            rels_part_for("[Content_Types].xml"),
            "_rels/[Content_Types].xml.rels"
        );
    }

    #[test]
    fn test_source_part_for() {
        assert_eq!(source_part_for("_rels/.rels"), Some(String::new()));
        assert_eq!(
            source_part_for("ppt/_rels/presentation.xml.rels"),
            Some("ppt/presentation.xml".to_string())
        );
        assert_eq!(source_part_for("ppt/slides/slide1.xml"), None);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../slideLayouts/slideLayout1.xml"),
            "ppt/slideLayouts/slideLayout1.xml"
        );
        assert_eq!(
            resolve_target("ppt/presentation.xml", "slides/slide1.xml"),
            "ppt/slides/slide1.xml"
        );
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "/ppt/media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(resolve_target("", "ppt/presentation.xml"), "ppt/presentation.xml");
    }

    #[test]
    fn test_relative_ref() {
        assert_eq!(
            relative_ref("ppt/slides/slide1.xml", "ppt/slideLayouts/slideLayout1.xml"),
            "../slideLayouts/slideLayout1.xml"
        );
        assert_eq!(
            relative_ref("ppt/slides/slide1.xml", "ppt/slides/slide2.xml"),
            "slide2.xml"
        );
        assert_eq!(relative_ref("", "ppt/presentation.xml"), "ppt/presentation.xml");
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix("ppt/slides/slide21.xml"), Some(21));
        assert_eq!(numeric_suffix("ppt/slideLayouts/slideLayout7.xml"), Some(7));
        assert_eq!(numeric_suffix("ppt/presentation.xml"), None);
    }

    proptest! {
        /// A relative reference resolved back against its source names the
        /// original target.
        #[test]
        fn relative_ref_round_trips(
            src_dirs in prop::collection::vec("[a-z]{1,8}", 0..4),
            tgt_dirs in prop::collection::vec("[a-z]{1,8}", 0..4),
            file in "[a-z]{1,8}\\.xml",
        ) {
            let source = if src_dirs.is_empty() {
                "source.xml".to_string()
            } else {
                format!("{}/source.xml", src_dirs.join("/"))
            };
            let target = if tgt_dirs.is_empty() {
                file.clone()
            } else {
                format!("{}/{}", tgt_dirs.join("/"), file)
            };
            let rel = relative_ref(&source, &target);
            prop_assert_eq!(resolve_target(&source, &rel), target);
        }
    }
}
