use std::fmt;

use sandbox::{Result, SandboxError};

/// Tag applied to every instance this crate creates. Bulk discovery and
/// cleanup select on it, so unrelated resources in the same account are
/// never touched.
pub const MARKER_TAG_KEY: &str = "cloud_sandbox";
pub const MARKER_TAG_VALUE: &str = "true";

/// Ordered sequence of (key, value) tag pairs.
///
/// Duplicate keys are kept as-is; the control plane applies its own
/// last-write semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<(String, String)>);

impl TagSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse the flat `k1=v1;k2=v2` form.
    pub fn parse(input: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        if input.is_empty() {
            return Ok(Self(pairs));
        }
        for pair in input.split(';') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SandboxError::InvalidConfig(format!(
                    "tag '{pair}' is not in key=value form (expected 'k1=v1;k2=v2')"
                ))
            })?;
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(Self(pairs))
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One control-plane describe filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

/// Filter matching instances that carry `key=value` as a tag.
pub fn tag_filter(key: &str, value: &str) -> Filter {
    Filter {
        name: format!("tag:{key}"),
        values: vec![value.to_string()],
    }
}

/// Filter matching every instance state that still holds resources and is
/// therefore subject to bulk cleanup.
pub fn active_state_filter() -> Filter {
    Filter {
        name: "instance-state-name".to_string(),
        values: ["pending", "running", "stopping", "stopped"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_ordered_pairs() {
        let input = "k1=v1;k2=v2";
        let tags = TagSet::parse(input).unwrap();
        assert_eq!(
            tags.pairs(),
            &[
                ("k1".to_string(), "v1".to_string()),
                ("k2".to_string(), "v2".to_string()),
            ]
        );
        assert_eq!(tags.to_string(), input);
        assert_eq!(TagSet::parse(&tags.to_string()).unwrap(), tags);
    }

    #[test]
    fn parse_empty_is_empty() {
        assert!(TagSet::parse("").unwrap().is_empty());
    }

    #[test]
    fn parse_malformed_pair_names_offender() {
        let err = TagSet::parse("k1=v1;oops").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("oops"), "message should name the pair: {msg}");
        assert!(matches!(err, SandboxError::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_keys_are_kept() {
        let tags = TagSet::parse("k=a;k=b").unwrap();
        assert_eq!(tags.len(), 2);
        // first occurrence wins for lookup, the service decides the rest
        assert_eq!(tags.get("k"), Some("a"));
    }

    #[test]
    fn tag_filter_shape() {
        let filter = tag_filter(MARKER_TAG_KEY, MARKER_TAG_VALUE);
        assert_eq!(filter.name, "tag:cloud_sandbox");
        assert_eq!(filter.values, vec!["true".to_string()]);
    }

    #[test]
    fn active_state_filter_excludes_terminated() {
        let filter = active_state_filter();
        assert_eq!(filter.name, "instance-state-name");
        assert!(!filter.values.iter().any(|v| v == "terminated"));
        assert_eq!(filter.values.len(), 4);
    }
}
