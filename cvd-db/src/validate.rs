//! Name grammars for groups and instances.
//!
//! The two grammars differ. A group name is a single identifier
//! (`[A-Za-z_][A-Za-z_0-9]*`, no hyphens: it doubles as a path component
//! and as the first half of a `group-instance` display name, so it can't
//! contain the separator that splits the two). An instance name is one or
//! more alphanumeric/underscore tokens joined by hyphens (`phone`,
//! `phone-a`, `cvd-3`): each token may itself start with a digit, since
//! auto-generated per-instance names (`cvd-{id}`) rely on that.

fn is_valid_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_group_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_instance_name(s: &str) -> bool {
    !s.is_empty() && s.split('-').all(is_valid_token)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert!(is_valid_group_name("cvd_1"));
        assert!(is_valid_group_name("_internal"));
        assert!(is_valid_instance_name("phone"));
        assert!(is_valid_instance_name("phone-a"));
        assert!(is_valid_instance_name("front_camera-a_1"));
        assert!(is_valid_instance_name("cvd-3"));
    }

    #[test]
    fn rejects_leading_digit_or_empty_group_name() {
        assert!(!is_valid_group_name("1cvd"));
        assert!(!is_valid_group_name(""));
        assert!(!is_valid_instance_name(""));
    }

    #[test]
    fn group_names_reject_hyphens() {
        assert!(!is_valid_group_name("cvd-1"));
    }

    #[test]
    fn instance_names_reject_empty_tokens_and_separators() {
        assert!(!is_valid_instance_name("a--b"));
        assert!(!is_valid_instance_name("-a"));
        assert!(!is_valid_instance_name("a-"));
        assert!(!is_valid_instance_name("a/b"));
    }
}
