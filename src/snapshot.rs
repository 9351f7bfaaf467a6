//! Immutable copy of the environment the whole pipeline runs against

use std::collections::BTreeMap;

/// Variable that scopes link variables under a project prefix
pub const ENV_PREFIX: &str = "ENV_PREFIX";

/// Ordered environment snapshot.
///
/// Enumeration follows the lexicographic order of variable names, so two
/// runs over the same snapshot always see the same encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    prefix: String,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Build a snapshot from arbitrary key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let prefix = vars
            .get(ENV_PREFIX)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}_", p.to_uppercase()))
            .unwrap_or_default();

        Self { vars, prefix }
    }

    /// Upper-cased `ENV_PREFIX` followed by `_`, or an empty string
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Iterate all variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw lookup of an exact key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Look up `<PREFIX><key>`, falling back to the bare `key`.
    /// Empty values count as absent.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.prefixed(key)
            .filter(|v| !v.is_empty())
            .or_else(|| self.get(key).filter(|v| !v.is_empty()))
    }

    /// Like [`lookup`](Self::lookup), but a variable that is set to an empty
    /// string is returned as set. Used where an empty value is itself invalid.
    pub fn lookup_set(&self, key: &str) -> Option<&str> {
        self.prefixed(key).or_else(|| self.get(key))
    }

    fn prefixed(&self, key: &str) -> Option<&str> {
        if self.prefix.is_empty() {
            return None;
        }
        self.get(&format!("{}{}", self.prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_prefix() {
        let env = EnvSnapshot::from_pairs([("WEBAPP_PATH", "/")]);
        assert_eq!(env.prefix(), "");
        assert_eq!(env.lookup("WEBAPP_PATH"), Some("/"));
    }

    #[test]
    fn test_prefix_is_upper_cased() {
        let env = EnvSnapshot::from_pairs([("ENV_PREFIX", "myproject")]);
        assert_eq!(env.prefix(), "MYPROJECT_");

        let env = EnvSnapshot::from_pairs([("ENV_PREFIX", "  ")]);
        assert_eq!(env.prefix(), "");
    }

    #[test]
    fn test_lookup_prefers_prefixed_key() {
        let env = EnvSnapshot::from_pairs([
            ("ENV_PREFIX", "proj"),
            ("PROJ_WEBAPP_PATH", "/scoped/"),
            ("WEBAPP_PATH", "/"),
            ("API_PATH", "/api/"),
        ]);
        assert_eq!(env.lookup("WEBAPP_PATH"), Some("/scoped/"));
        assert_eq!(env.lookup("API_PATH"), Some("/api/"));
        assert_eq!(env.lookup("OTHER_PATH"), None);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let env = EnvSnapshot::from_pairs([("WEBAPP_HOSTNAME", "")]);
        assert_eq!(env.lookup("WEBAPP_HOSTNAME"), None);
        assert_eq!(env.get("WEBAPP_HOSTNAME"), Some(""));
    }

    #[test]
    fn test_lookup_set_keeps_empty_values() {
        let env = EnvSnapshot::from_pairs([
            ("ENV_PREFIX", "proj"),
            ("PROJ_WEBAPP_EXPOSE_PROTOCOL", ""),
            ("WEBAPP_EXPOSE_PROTOCOL", "https"),
            ("API_BALANCING_TYPE", ""),
        ]);
        assert_eq!(env.lookup_set("WEBAPP_EXPOSE_PROTOCOL"), Some(""));
        assert_eq!(env.lookup("WEBAPP_EXPOSE_PROTOCOL"), Some("https"));
        assert_eq!(env.lookup_set("API_BALANCING_TYPE"), Some(""));
        assert_eq!(env.lookup_set("API_EXPOSE_PROTOCOL"), None);
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let env = EnvSnapshot::from_pairs([("B", "2"), ("A", "1"), ("C", "3")]);
        let keys: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }
}
