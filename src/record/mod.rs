//! Sample records: the detailed per-corpus form and the reduced per-partition form.

pub mod partition;
pub mod sample;

pub use partition::PartitionRecord;
pub use sample::SampleRecord;

/// Derive the source episode of a sample from its name.
///
/// `podcast_ep_1003` → `podcast_ep`, `ep_1003` → `ep`, `single` → `single`.
pub fn episode_name(sample_name: &str) -> &str {
    let parts = sample_name.split('_').count();
    if parts > 2 {
        match sample_name.rfind('_') {
            Some(idx) => &sample_name[..idx],
            None => sample_name,
        }
    } else {
        sample_name.split('_').next().unwrap_or(sample_name)
    }
}

/// Owned variant of [`sanitize_field`] for constructor arguments.
pub(crate) fn sanitized(value: impl Into<String>) -> String {
    let value: String = value.into();
    sanitize_field(&value)
}

/// Make a free-text value safe for a tab-separated ledger column.
pub(crate) fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_name_strips_trailing_ordinal() {
        assert_eq!(episode_name("podcast_ep_1003"), "podcast_ep");
        assert_eq!(episode_name("a_b_c_1000"), "a_b_c");
    }

    #[test]
    fn episode_name_with_two_parts_takes_first() {
        assert_eq!(episode_name("ep42_1003"), "ep42");
    }

    #[test]
    fn episode_name_without_separator_is_identity() {
        assert_eq!(episode_name("standalone"), "standalone");
        assert_eq!(episode_name(""), "");
    }

    #[test]
    fn sanitize_field_replaces_separators() {
        assert_eq!(sanitize_field(" grüezi\twohl\n"), "grüezi wohl");
    }
}
