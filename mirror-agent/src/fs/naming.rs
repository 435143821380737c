//! Local names derived from remote names.

/// Characters that are invalid in file names on at least one supported platform.
const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Map a remote name to a single safe path component.
///
/// Each run of reserved characters collapses to one `_`. Names that would
/// resolve to the current or parent directory are replaced outright, so a
/// mirror path never escapes its set.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if RESERVED.contains(&c) || c.is_control() {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }

    match out.as_str() {
        "" | "." | ".." => "_".repeat(out.len().max(1)),
        _ => out,
    }
}
