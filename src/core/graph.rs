//! Types for representing the target dependency graph.
//!
//! Targets are declared up front, before resolution begins. The registry is an explicit value
//! owned by the caller; declaring a target twice returns the same entry, so a configuration
//! script can build up a target's dependencies and roles across several statements.

use indexmap::IndexMap;

/// A machine profile: a named node in the dependency graph.
///
/// A target lists the targets it depends on and the roles directly assigned to it. Both lists
/// preserve declaration order, which is significant: dependencies are resolved in the order
/// they were declared, and a target's own roles are applied in the order they were assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    name: String,
    requires: Vec<String>,
    roles: Vec<String>,
}

impl Target {
    fn new(name: impl Into<String>) -> Self {
        Target {
            name: name.into(),
            requires: Vec::new(),
            roles: Vec::new(),
        }
    }

    /// Declares that this target depends on `names`, appending to any existing dependencies.
    ///
    /// Dependencies are not validated here; an unknown name surfaces as an error during
    /// resolution, not declaration.
    pub fn depends_on<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    /// Assigns `roles` to this target, appending to any existing assignments.
    pub fn has_roles<I, S>(&mut self, roles: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// The target's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the targets this target depends on, in declaration order.
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Names of the roles directly assigned to this target, in declaration order.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

/// The set of declared targets for one convergence run.
///
/// Insertion order is preserved so that iteration and error messages are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetRegistry {
    targets: IndexMap<String, Target>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the target named `name`, declaring it first if it does not exist yet.
    pub fn target(&mut self, name: &str) -> &mut Target {
        self.targets
            .entry(name.to_string())
            .or_insert_with(|| Target::new(name))
    }

    /// Looks up a declared target by name.
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Returns whether a target named `name` has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Iterates over declared targets in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// The number of declared targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns whether no targets have been declared.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
