//! Requirement and feature labels attached to conformance tests.

/// Tests validating a MUST clause.
pub const REQUIRED: &str = "Required";
/// Tests validating a SHOULD/MAY clause.
pub const OPTIONAL: &str = "Optional";

pub const CONNECTIVITY: &str = "Connectivity";
pub const CLUSTER_IP: &str = "ClusterIP";
pub const HEADLESS: &str = "Headless";
pub const ENDPOINT_SLICE: &str = "EndpointSlice";

/// Default reporting order for requirement labels.
pub fn default_priority() -> Vec<String> {
    vec![REQUIRED.to_string(), OPTIONAL.to_string()]
}

/// Order `labels` by `priority` first, then lexically for everything else.
pub fn ordered<'a, I>(labels: I, priority: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut rest: Vec<String> = Vec::new();
    let mut present: Vec<&str> = Vec::new();
    for label in labels {
        if !present.contains(&label) {
            present.push(label);
        }
    }

    let mut ordered: Vec<String> = priority
        .iter()
        .filter(|p| present.contains(&p.as_str()))
        .cloned()
        .collect();

    for label in present {
        if !priority.iter().any(|p| p == label) {
            rest.push(label.to_string());
        }
    }
    rest.sort();
    ordered.extend(rest);
    ordered
}

/// Include/exclude label filter, applied before a test runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabelFilter {
    /// When non-empty, a test must carry at least one of these labels.
    #[serde(default)]
    pub include: Vec<String>,
    /// A test carrying any of these labels is skipped.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl LabelFilter {
    pub fn matches<'a, I>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if labels
            .clone()
            .into_iter()
            .any(|l| self.exclude.iter().any(|e| e == l))
        {
            return false;
        }
        self.include.is_empty()
            || labels
                .into_iter()
                .any(|l| self.include.iter().any(|i| i == l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_then_lexical() {
        let order = ordered(
            ["Headless", "Optional", "ClusterIP", "Required", "Optional"],
            &default_priority(),
        );
        assert_eq!(order, vec!["Required", "Optional", "ClusterIP", "Headless"]);
    }

    #[test]
    fn test_missing_priority_labels_are_omitted() {
        let order = ordered(["Optional"], &default_priority());
        assert_eq!(order, vec!["Optional"]);
    }

    #[test]
    fn test_filter() {
        let filter = LabelFilter {
            include: vec![],
            exclude: vec![ENDPOINT_SLICE.to_string()],
        };
        assert!(filter.matches([REQUIRED]));
        assert!(!filter.matches([OPTIONAL, ENDPOINT_SLICE]));

        let focus = LabelFilter {
            include: vec![REQUIRED.to_string()],
            exclude: vec![],
        };
        assert!(focus.matches([REQUIRED, CLUSTER_IP]));
        assert!(!focus.matches([OPTIONAL]));
    }
}
