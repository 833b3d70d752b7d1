use thiserror::Error;

use crate::storage::NODE_METADATA_FILE;

/// A hierarchy node name.
///
/// A name is one component of a [`NodePath`](super::NodePath).
#[derive(Debug, PartialEq, Eq)]
pub struct NodeName(String);

/// An invalid node name.
#[derive(Debug, Error)]
#[error("invalid node name {0}")]
pub struct NodeNameError(String);

impl NodeName {
    /// Create a new node name from `name`.
    ///
    /// # Errors
    /// Returns [`NodeNameError`] if `name` is not valid according to [`NodeName::validate`()].
    pub fn new(name: &str) -> Result<Self, NodeNameError> {
        if Self::validate(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(NodeNameError(name.to_string()))
        }
    }

    /// Extracts a string slice containing the node name `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a node name. A node name
    /// - must not be the empty string (""),
    /// - must not include the character "/",
    /// - must not be a string composed only of period characters, e.g. "." or "..", and
    /// - must not be `node.json`, the key of the metadata document of the parent group.
    ///
    /// Chunk data lives under `c/` of a dataset, which never has children, so `c` is a valid name.
    #[must_use]
    pub fn validate(node_name: &str) -> bool {
        !node_name.is_empty()
            && !node_name.contains('/')
            && !node_name.replace('.', "").is_empty()
            && node_name != NODE_METADATA_FILE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_name() {
        assert!(NodeName::new("a").is_ok());
        assert_eq!(NodeName::new("values.1").unwrap().as_str(), "values.1");
        assert!(NodeName::new("").is_err());
        assert!(NodeName::new("a/b").is_err());
        assert!(NodeName::new("..").is_err());
        assert!(NodeName::new("__a").is_ok());
        assert!(NodeName::new("c").is_ok());
        assert_eq!(
            NodeName::new("node.json").unwrap_err().to_string(),
            "invalid node name node.json"
        );
    }
}
