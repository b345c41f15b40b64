/// Names no tenant may use as a channel slot or path segment.
pub const RESERVED_NAMES: &[&str] = &[
    "system", "admin", "auth", "control", "internal", "global", "all", "*",
];

pub fn is_reserved_name(candidate: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(candidate))
}

/// Path segments additionally forbid `.` and the empty segment.
pub fn is_reserved_segment(segment: &str) -> bool {
    segment.is_empty() || segment == "." || is_reserved_name(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case() {
        assert!(is_reserved_name("Admin"));
        assert!(is_reserved_name("*"));
        assert!(!is_reserved_name("admins"));
        assert!(is_reserved_segment(""));
        assert!(is_reserved_segment("."));
        assert!(!is_reserved_segment("uploads"));
    }
}
