//! Email to group membership lookup.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::{Error, Result};

/// Group assigned to identities with no configured membership.
pub const DEFAULT_GROUP: &str = "user";

/// Group memberships keyed by email, loaded once at startup.
///
/// The document is a YAML mapping:
///
/// ```yaml
/// alice@co.com: [system:masters]
/// bob@co.com:
///   - developers
///   - on-call
/// ```
#[derive(Debug, Clone, Default)]
pub struct GroupDirectory {
    groups: HashMap<String, Vec<String>>,
}

impl GroupDirectory {
    /// Build a directory from an in-memory mapping.
    #[must_use]
    pub fn new(groups: HashMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    /// Load the YAML mapping at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a mapping of
    /// strings to string lists.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read groups file {}: {e}", path.display()))
        })?;
        let directory = Self::from_yaml(&contents)?;
        info!(path = %path.display(), identities = directory.groups.len(), "Loaded group memberships");
        Ok(directory)
    }

    /// Parse a YAML mapping document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(serde_yaml::from_str(contents)?))
    }

    /// Groups for `email`; `["user"]` when none are configured.
    #[must_use]
    pub fn lookup(&self, email: &str) -> Vec<String> {
        match self.groups.get(email) {
            Some(groups) if !groups.is_empty() => groups.clone(),
            _ => vec![DEFAULT_GROUP.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOC: &str = "alice@co.com: [system:masters]\nbob@co.com:\n  - developers\n  - on-call\nnobody@co.com: []\n";

    #[test]
    fn known_email_gets_exactly_its_groups() {
        let groups = GroupDirectory::from_yaml(DOC).unwrap();

        assert_eq!(groups.lookup("alice@co.com"), vec!["system:masters"]);
        assert_eq!(groups.lookup("bob@co.com"), vec!["developers", "on-call"]);
    }

    #[test]
    fn unknown_or_empty_membership_defaults_to_user() {
        let groups = GroupDirectory::from_yaml(DOC).unwrap();

        assert_eq!(groups.lookup("carol@co.com"), vec!["user"]);
        assert_eq!(groups.lookup("nobody@co.com"), vec!["user"]);
    }

    #[test]
    fn empty_document_is_empty_directory() {
        let groups = GroupDirectory::from_yaml("  \n").unwrap();
        assert_eq!(groups.lookup("alice@co.com"), vec!["user"]);
    }

    #[test]
    fn malformed_document_is_error() {
        assert!(GroupDirectory::from_yaml("- just\n- a list\n").is_err());
    }

    #[test]
    fn from_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();

        let groups = GroupDirectory::from_file(file.path()).unwrap();
        assert_eq!(groups.lookup("alice@co.com"), vec!["system:masters"]);
    }

    #[test]
    fn from_missing_file_is_config_error() {
        let err = GroupDirectory::from_file(Path::new("/nonexistent/groups.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
