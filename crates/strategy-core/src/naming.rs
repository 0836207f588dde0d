/// Reserved prefix marking a strategy the core created transiently — for
/// count evaluation or control tests — rather than one a user asked to save
/// (§4.3 "Internal strategies").
pub const INTERNAL_PREFIX: &str = "__internal__:";

/// Build an internal strategy name from a short label, e.g.
/// `internal_name("count-check")` -> `"__internal__:count-check"`.
pub fn internal_name(label: &str) -> String {
    format!("{INTERNAL_PREFIX}{label}")
}

/// The predicate cleanup routines use to avoid listing internal strategies
/// to users (§4.3): the external platform offers no metadata slot of its
/// own, so the reserved name prefix is the only signal available.
pub fn is_internal(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_prefix() {
        let name = internal_name("count-check");
        assert_eq!(name, "__internal__:count-check");
        assert!(is_internal(&name));
        assert!(!is_internal("My Saved Strategy"));
    }
}
