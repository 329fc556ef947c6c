//! # Campaigns
//!
//! ## Role
//! An ordered, named list of package paths, for feeding a loader. Order is
//! override precedence: later packages win.
//!
//! Campaigns form a tree. A child starts with a copy of its parent's ordered
//! packages and is then edited on its own; `replace` can push a substitution
//! down to every descendant.
//!
//! In memory only. Persisting campaigns is left to the host.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PresamplesError, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Campaign {
    name: String,
    description: Option<String>,
    parent: Option<String>,
    packages: Vec<PathBuf>,
    children: Vec<Campaign>,
}

impl Campaign {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Name of the parent campaign
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.position(path.as_ref()).is_some()
    }

    /// Package paths in load order
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.packages.iter().map(PathBuf::as_path)
    }

    /// Append a package
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let index = self.packages.len();
        self.insert(index, path)
    }

    /// Insert a package at `index`, shifting later packages back.
    /// An index past the end appends.
    pub fn insert(&mut self, index: usize, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.contains(path) {
            return Err(PresamplesError::DuplicatePackage {
                campaign: self.name.clone(),
                path: path.to_path_buf(),
            });
        }
        let index = index.min(self.packages.len());
        self.packages.insert(index, path.to_path_buf());
        Ok(())
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let index = self.position(path).ok_or_else(|| self.missing(path))?;
        self.packages.remove(index);
        Ok(())
    }

    /// Put `new` in the place of `old`.
    ///
    /// With `propagate`, every descendant still using `old` is updated too.
    pub fn replace(
        &mut self,
        new: impl AsRef<Path>,
        old: impl AsRef<Path>,
        propagate: bool,
    ) -> Result<()> {
        let (new, old) = (new.as_ref(), old.as_ref());
        let index = self.position(old).ok_or_else(|| self.missing(old))?;
        self.packages[index] = new.to_path_buf();
        if propagate {
            for child in &mut self.children {
                child.replace_in_tree(new, old);
            }
        }
        Ok(())
    }

    fn replace_in_tree(&mut self, new: &Path, old: &Path) {
        if let Some(index) = self.position(old) {
            self.packages[index] = new.to_path_buf();
        }
        for child in &mut self.children {
            child.replace_in_tree(new, old);
        }
    }

    /// Create a child starting with this campaign's packages
    pub fn add_child(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<&mut Campaign> {
        let name = name.into();
        if name == self.name || self.descendants().iter().any(|c| c.name == name) {
            return Err(PresamplesError::config(format!(
                "campaign '{}' already exists",
                name
            )));
        }
        self.children.push(Campaign {
            name,
            description,
            parent: Some(self.name.clone()),
            packages: self.packages.clone(),
            children: Vec::new(),
        });
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Direct children, ordered by name
    pub fn children(&self) -> Vec<&Campaign> {
        let mut children: Vec<&Campaign> = self.children.iter().collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Campaign> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// All descendants, ordered by depth and then name
    pub fn descendants(&self) -> Vec<&Campaign> {
        let mut out = Vec::new();
        let mut level = self.children();
        while !level.is_empty() {
            let mut next: Vec<&Campaign> = level.iter().flat_map(|c| c.children()).collect();
            next.sort_by(|a, b| a.name.cmp(&b.name));
            out.extend(level);
            level = next;
        }
        out
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.packages.iter().position(|p| p == path)
    }

    fn missing(&self, path: &Path) -> PresamplesError {
        PresamplesError::MissingPackage {
            campaign: self.name.clone(),
            path: path.to_path_buf(),
        }
    }
}

impl<'a> IntoIterator for &'a Campaign {
    type Item = &'a Path;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, PathBuf>, fn(&PathBuf) -> &Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter().map(PathBuf::as_path as fn(&PathBuf) -> &Path)
    }
}

impl fmt::Display for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(
                f,
                "Campaign {} with parent {} and {} packages",
                self.name,
                parent,
                self.packages.len()
            ),
            None => write!(
                f,
                "Campaign {} with no parent and {} packages",
                self.name,
                self.packages.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_and_insert() {
        let mut c = Campaign::new("base");
        c.add("a").unwrap();
        c.add("c").unwrap();
        c.insert(1, "b").unwrap();
        c.insert(99, "d").unwrap();
        let order: Vec<&Path> = c.iter().collect();
        assert_eq!(order, vec![Path::new("a"), Path::new("b"), Path::new("c"), Path::new("d")]);

        assert!(matches!(c.add("a"), Err(PresamplesError::DuplicatePackage { .. })));
        c.remove("b").unwrap();
        assert!(!c.contains("b"));
        assert!(matches!(c.remove("b"), Err(PresamplesError::MissingPackage { .. })));
        assert_eq!(c.to_string(), "Campaign base with no parent and 3 packages");
    }

    #[test]
    fn test_children_and_propagation() {
        let mut root = Campaign::new("root");
        root.add("p1").unwrap();
        root.add("p2").unwrap();

        let child = root.add_child("kid", None).unwrap();
        child.add("p3").unwrap();
        child.add_child("grandkid", Some("deep".into())).unwrap();
        assert!(root.add_child("kid", None).is_err());

        let kid = root.child_mut("kid").unwrap();
        assert_eq!(kid.parent(), Some("root"));
        assert_eq!(kid.iter().collect::<Vec<_>>(), vec![Path::new("p1"), Path::new("p2"), Path::new("p3")]);

        root.replace("p9", "p1", true).unwrap();
        assert!(root.contains("p9"));
        let names: Vec<&str> = root.descendants().into_iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["kid", "grandkid"]);
        assert!(root.descendants().iter().all(|c| c.contains("p9") && !c.contains("p1")));

        assert!(matches!(
            root.replace("x", "p1", false),
            Err(PresamplesError::MissingPackage { .. })
        ));
    }

    #[test]
    fn test_into_iterator_for_loader_input() {
        let mut c = Campaign::new("c");
        c.add("x").unwrap();
        let paths: Vec<&Path> = (&c).into_iter().collect();
        assert_eq!(paths, vec![Path::new("x")]);
    }
}
