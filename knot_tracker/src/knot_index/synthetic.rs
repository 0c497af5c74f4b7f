//! Recognition of compiler-generated container names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Choice branches (`c-0`), gathers (`g-3`), single-letter internal blocks
/// (`s`, `b`) and return slots (`$r`, `$r1`).
static SYNTHETIC_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[cg]-\d+|[a-z]|\$r\d*)$").expect("synthetic name pattern must compile")
});

/// Names the compiler reserves for whole-story containers.
const RESERVED_NAMES: &[&str] = &["global decl"];

/// Whether `name` is an internal identifier rather than an author's knot.
pub fn is_synthetic_name(name: &str) -> bool {
    name.is_empty() || RESERVED_NAMES.contains(&name) || SYNTHETIC_NAME.is_match(name)
}
