use derive_more::Display;
use thiserror::Error;

use super::{NodeName, NodeNameError};

/// A hierarchy node path, e.g. `/group/dataset`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct NodePath(String);

/// An invalid node path.
#[derive(Debug, Error)]
pub enum NodePathError {
    /// The path is malformed.
    #[error("invalid node path {0}")]
    InvalidPath(String),
    /// A component of the path is not a valid node name.
    #[error(transparent)]
    InvalidName(#[from] NodeNameError),
}

impl NodePath {
    /// Create a new node path from `path`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `path` is not valid according to [`NodePath::validate`()] or a component is not a valid [`NodeName`].
    pub fn new(path: &str) -> Result<Self, NodePathError> {
        if !Self::validate(path) {
            return Err(NodePathError::InvalidPath(path.to_string()));
        }
        if path != "/" {
            for component in path[1..].split('/') {
                NodeName::new(component)?;
            }
        }
        Ok(Self(path.to_string()))
    }

    /// The root node.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Extracts a string slice containing the node path `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Validates a path.
    ///
    /// A path always starts with `/`, and a non-root path cannot end with `/` or contain an empty component (`//`).
    #[must_use]
    pub fn validate(path: &str) -> bool {
        path.eq("/") || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"))
    }

    /// Resolve `name` relative to this path.
    ///
    /// - `.` (or `./`) resolves to this path,
    /// - a name starting with `/` is absolute, and
    /// - any other name is appended, e.g. `a/b` relative to `/g` is `/g/a/b`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if the resolved path is not valid.
    pub fn join(&self, name: &str) -> Result<Self, NodePathError> {
        let name = name.strip_prefix("./").unwrap_or(name);
        if name == "." {
            Ok(self.clone())
        } else if name.starts_with('/') {
            Self::new(name)
        } else if self.is_root() {
            Self::new(&format!("/{name}"))
        } else {
            Self::new(&format!("{}/{name}", self.0))
        }
    }

    /// Returns the path of the parent node, or [`None`] for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
        }
    }
}

impl TryFrom<&str> for NodePath {
    type Error = NodePathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_path() {
        assert!(NodePath::new("/").is_ok());
        assert!(NodePath::new("/a/b").is_ok());
        assert_eq!(NodePath::new("/a/b").unwrap().to_string(), "/a/b");
        assert!(NodePath::new("/a/b/").is_err());
        assert_eq!(
            NodePath::new("/a/b/").unwrap_err().to_string(),
            "invalid node path /a/b/"
        );
        assert!(NodePath::new("/a//b").is_err());
        assert!(NodePath::new("a").is_err());
        assert!(NodePath::new("/a/c").is_err());
    }

    #[test]
    fn node_path_join() {
        let root = NodePath::root();
        assert_eq!(root.join("a").unwrap().as_str(), "/a");
        assert_eq!(root.join(".").unwrap(), root);
        let group = NodePath::new("/g").unwrap();
        assert_eq!(group.join("a/b").unwrap().as_str(), "/g/a/b");
        assert_eq!(group.join("./a").unwrap().as_str(), "/g/a");
        assert_eq!(group.join("/x").unwrap().as_str(), "/x");
        assert_eq!(group.join(".").unwrap(), group);
        assert!(group.join("").is_err());
        assert!(group.join("a/").is_err());
        assert!(group.join("..").is_err());
    }

    #[test]
    fn node_path_parent() {
        assert_eq!(NodePath::root().parent(), None);
        assert_eq!(
            NodePath::new("/a").unwrap().parent(),
            Some(NodePath::root())
        );
        assert_eq!(
            NodePath::new("/a/b/c1").unwrap().parent(),
            Some(NodePath::new("/a/b").unwrap())
        );
    }
}
