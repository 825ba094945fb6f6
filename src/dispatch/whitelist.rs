//! Command Whitelist
//!
//! The set of command names allowed to reach the executable. Built once at
//! startup and only read afterwards, so it is shared without locking.

use std::collections::HashSet;

/// Commands permitted when the configuration does not list any.
pub const DEFAULT_COMMANDS: &[&str] = &["getpath", "readIPaddress", "ViewOnline"];

/// An immutable set of permitted command names.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    commands: HashSet<String>,
}

impl Whitelist {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Permitted names in sorted order (for logging).
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new(DEFAULT_COMMANDS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_exact() {
        let whitelist = Whitelist::new(["getpath", "ViewOnline"]);

        assert!(whitelist.contains("getpath"));
        assert!(!whitelist.contains("GETPATH"));
        assert!(!whitelist.contains("viewonline"));
        assert!(!whitelist.contains("getpath "));
        assert!(!whitelist.contains(""));
    }

    #[test]
    fn test_default_commands() {
        let whitelist = Whitelist::default();
        assert_eq!(whitelist.len(), 3);
        assert_eq!(
            whitelist.sorted(),
            vec!["ViewOnline", "getpath", "readIPaddress"]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let whitelist = Whitelist::new(vec!["ls".to_string(), "ls".to_string()]);
        assert_eq!(whitelist.len(), 1);
        assert!(!whitelist.is_empty());
    }
}
