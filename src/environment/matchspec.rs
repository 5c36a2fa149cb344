// src/environment/matchspec.rs

//! Minimal package specifier parsing
//!
//! Understands the three shapes that appear in environment descriptions:
//! `name`, `channel::name <version> <build>` / `name=version=build`, and
//! explicit URLs ending in `name-version-build.tar.bz2` or `.conda`.

/// Package archive extensions, longest first
const ARCHIVE_EXTENSIONS: [&str; 2] = [".tar.bz2", ".conda"];

/// Characters that end the name part of a specifier
const NAME_TERMINATORS: [char; 8] = [' ', '\t', '=', '<', '>', '!', '~', '['];

/// `name`, `version`, `build` of a package archive file name
pub fn split_archive_name(filename: &str) -> Option<(&str, &str, &str)> {
    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(ext))
        .unwrap_or(filename);
    let mut parts = stem.rsplitn(3, '-');
    let build = parts.next()?;
    let version = parts.next()?;
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }
    Some((name, version, build))
}

fn is_url(spec: &str) -> bool {
    spec.contains("://")
}

/// Archive file name of an explicit URL, without any `#hash` fragment
fn url_filename(spec: &str) -> &str {
    let without_fragment = spec.split('#').next().unwrap_or(spec);
    without_fragment
        .rsplit('/')
        .next()
        .unwrap_or(without_fragment)
}

fn strip_channel(spec: &str) -> &str {
    match spec.rfind("::") {
        Some(idx) => &spec[idx + 2..],
        None => spec,
    }
}

/// Package name a specifier refers to
pub fn package_name(spec: &str) -> Option<&str> {
    let spec = spec.trim();
    if spec.is_empty() || spec.starts_with('#') {
        return None;
    }
    if is_url(spec) {
        return split_archive_name(url_filename(spec)).map(|(name, _, _)| name);
    }
    let spec = strip_channel(spec).trim();
    let end = spec.find(NAME_TERMINATORS).unwrap_or(spec.len());
    let name = &spec[..end];
    (!name.is_empty()).then_some(name)
}

/// Version/build part of a specifier, `None` when unconstrained
pub fn version_part(spec: &str) -> Option<&str> {
    let spec = spec.trim();
    if is_url(spec) {
        return split_archive_name(url_filename(spec)).map(|(_, version, _)| version);
    }
    let spec = strip_channel(spec).trim();
    let name = package_name(spec)?;
    let rest = spec[name.len()..].trim();
    (!rest.is_empty()).then_some(rest)
}

/// Whether `spec` names an exact, already-solved build
pub fn is_pinned(spec: &str) -> bool {
    is_url(spec.trim())
}

/// Whether a declared specifier is compatible with a required constraint
///
/// Containment only: an unversioned or URL-pinned declaration is accepted,
/// a versioned one must contain the constraint text (whitespace ignored).
pub fn satisfies(spec: &str, constraint: &str) -> bool {
    let constraint: String = constraint.split_whitespace().collect();
    if constraint.is_empty() || is_pinned(spec) {
        return true;
    }
    match version_part(spec) {
        None => true,
        Some(declared) => {
            let declared: String = declared.split_whitespace().collect();
            declared.contains(&constraint)
        }
    }
}
