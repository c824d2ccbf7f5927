//! Resolves a selected target into an ordered plan of resources.
//!
//! Resolution walks the dependency graph depth-first from the selected target. Roles are
//! collected in post-order: a target's own roles are appended only after all of its
//! dependencies' roles, so a target may assume its dependencies' state already exists. A role
//! name reachable by several paths is included exactly once, at the position of its first
//! completed traversal, which makes the plan deterministic regardless of graph redundancy.
//!
//! Resolution is the last point before mutation: every structural problem (unknown target or
//! role, dependency cycle, unloadable role definition) surfaces here, so a run that reaches
//! the convergence engine can no longer abort.

use crate::core::graph::TargetRegistry;
use crate::core::resource::Resource;
use crate::core::role::{LoadError, Role, RoleLoader};
use indexmap::{IndexMap, IndexSet};
use log::debug;

/// One entry of a [ResolvedPlan]: a resource to assert, in the context of the role that
/// declared it.
///
/// The role's variables ride along because they are needed again at diff time, when a file
/// template is rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanStep {
    /// The name of the role that declared this resource.
    pub role: String,

    /// The declaring role's variables.
    pub vars: IndexMap<String, String>,

    /// The resource to assert, with role variables already substituted into its fields.
    pub resource: Resource,
}

/// The ordered sequence of resources to apply for one target.
///
/// Produced fresh by [resolve] for each run; never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedPlan {
    steps: Vec<PlanStep>,
}

impl ResolvedPlan {
    /// Assembles a plan directly from steps, bypassing graph resolution. Useful for callers
    /// that build plans programmatically.
    pub fn new(steps: Vec<PlanStep>) -> Self {
        ResolvedPlan { steps }
    }

    /// The plan's steps, in application order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Iterates over the plan's steps in application order.
    pub fn iter(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter()
    }

    /// The number of resources in the plan.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns whether the plan contains no resources.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The distinct role names in the plan, in application order.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles = IndexSet::new();
        for step in &self.steps {
            roles.insert(step.role.as_str());
        }
        roles.into_iter().collect()
    }

    /// Returns the plan restricted by role name: when `limit` is given, only its roles are
    /// kept; roles named in `skip` are dropped either way. Order is preserved; steps are never
    /// reordered.
    pub fn filter_roles(self, limit: Option<&[&str]>, skip: &[&str]) -> Self {
        let steps = self
            .steps
            .into_iter()
            .filter(|step| {
                if let Some(limit) = limit {
                    if !limit.contains(&step.role.as_str()) {
                        return false;
                    }
                }
                !skip.contains(&step.role.as_str())
            })
            .collect();
        ResolvedPlan { steps }
    }
}

impl<'p> IntoIterator for &'p ResolvedPlan {
    type Item = &'p PlanStep;
    type IntoIter = std::slice::Iter<'p, PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// An error encountered while resolving a target. All variants are structural and fatal: they
/// surface before any mutation happens.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The selected target, or a name in some target's dependencies, was never declared.
    #[error("unknown target '{name}'")]
    UnknownTarget { name: String },

    /// A target assigns a role the loader has no definition for.
    #[error("target '{target}' assigns unknown role '{role}'")]
    UnknownRole { target: String, role: String },

    /// The dependency graph contains a cycle reachable from the selected target. The path
    /// starts and ends with the same target.
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A role definition exists but could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Computes the ordered, de-duplicated plan for `target`.
///
/// Role definitions are loaded through `loader`, each distinct role name exactly once per call;
/// the loaded roles' variables are substituted into their resources as the plan is assembled.
pub fn resolve(
    registry: &TargetRegistry,
    target: &str,
    loader: &dyn RoleLoader,
) -> Result<ResolvedPlan, ResolveError> {
    let mut resolver = Resolver {
        registry,
        loader,
        finished: IndexSet::new(),
        stack: Vec::new(),
        roles: IndexMap::new(),
        steps: Vec::new(),
    };
    resolver.visit(target)?;

    debug!(
        "resolved target '{target}': {} roles, {} resources",
        resolver.roles.len(),
        resolver.steps.len(),
    );
    Ok(ResolvedPlan {
        steps: resolver.steps,
    })
}

struct Resolver<'r> {
    registry: &'r TargetRegistry,
    loader: &'r dyn RoleLoader,

    /// Targets whose traversal has completed (black in the usual three-color scheme).
    finished: IndexSet<String>,

    /// Targets currently on the DFS stack (gray). Meeting one of these again is a cycle.
    stack: Vec<String>,

    /// Roles loaded so far, keyed by name. Doubles as the first-wins deduplication set.
    roles: IndexMap<String, Role>,

    steps: Vec<PlanStep>,
}

impl Resolver<'_> {
    fn visit(&mut self, name: &str) -> Result<(), ResolveError> {
        let Some(target) = self.registry.get(name) else {
            return Err(ResolveError::UnknownTarget {
                name: name.to_string(),
            });
        };

        if self.finished.contains(name) {
            return Ok(());
        }

        if let Some(position) = self.stack.iter().position(|gray| gray == name) {
            let mut path = self.stack[position..].to_vec();
            path.push(name.to_string());
            return Err(ResolveError::Cycle { path });
        }

        self.stack.push(name.to_string());
        for dependency in target.requires() {
            self.visit(dependency)?;
        }
        self.stack.pop();
        self.finished.insert(name.to_string());

        for role_name in target.roles() {
            if self.roles.contains_key(role_name) {
                // Already collected via an earlier path; first position wins.
                continue;
            }

            debug!("loading role '{role_name}' for target '{name}'");
            let role = match self.loader.load(role_name) {
                Ok(role) => role,
                Err(LoadError::NotFound { .. }) => {
                    return Err(ResolveError::UnknownRole {
                        target: name.to_string(),
                        role: role_name.clone(),
                    })
                }
                Err(err) => return Err(err.into()),
            };

            for resource in role.compiled_resources() {
                self.steps.push(PlanStep {
                    role: role_name.clone(),
                    vars: role.vars.clone(),
                    resource,
                });
            }
            self.roles.insert(role_name.clone(), role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::resource::ContentSpec;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// A [RoleLoader] over an in-memory map that records every load request.
    struct MapLoader {
        roles: HashMap<String, Role>,
        loads: RefCell<Vec<String>>,
    }

    impl MapLoader {
        fn new(roles: impl IntoIterator<Item = Role>) -> Self {
            MapLoader {
                roles: roles
                    .into_iter()
                    .map(|role| (role.name.clone(), role))
                    .collect(),
                loads: RefCell::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }

        fn loads(&self) -> Vec<String> {
            self.loads.borrow().clone()
        }
    }

    impl RoleLoader for MapLoader {
        fn load(&self, name: &str) -> Result<Role, LoadError> {
            self.loads.borrow_mut().push(name.to_string());
            self.roles
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::NotFound {
                    name: name.to_string(),
                })
        }
    }

    /// Returns a role whose single resource is a package named `pkg-<name>`.
    fn role(name: &str) -> Role {
        Role {
            source: None,
            name: name.to_string(),
            vars: IndexMap::new(),
            resources: vec![Resource::Package {
                name: format!("pkg-{name}"),
            }],
        }
    }

    #[test]
    fn collects_roles_in_post_order() {
        let registry = fixtures::registry();
        let loader = MapLoader::new([role("git"), role("shell")]);

        let plan = resolve(&registry, "workstation", &loader).unwrap();
        assert_eq!(vec!["git", "shell"], plan.roles());
    }

    #[test]
    fn resolving_a_leaf_ignores_unreachable_targets() {
        let registry = fixtures::registry();
        let loader = MapLoader::new([role("git")]);

        let plan = resolve(&registry, "base", &loader).unwrap();
        assert_eq!(vec!["git"], plan.roles());
    }

    #[test]
    fn own_roles_keep_declaration_order() {
        let mut registry = TargetRegistry::new();
        registry.target("solo").has_roles(["zeta", "alpha", "mid"]);
        let loader = MapLoader::new([role("zeta"), role("alpha"), role("mid")]);

        let plan = resolve(&registry, "solo", &loader).unwrap();
        assert_eq!(vec!["zeta", "alpha", "mid"], plan.roles());
    }

    #[test]
    fn deduplicates_roles_at_first_completed_position() {
        // A diamond: top depends on left and right, which both assign "shared".
        let mut registry = TargetRegistry::new();
        registry.target("left").has_roles(["shared", "l"]);
        registry.target("right").has_roles(["shared", "r"]);
        registry
            .target("top")
            .depends_on(["left", "right"])
            .has_roles(["t"]);
        let loader = MapLoader::new([role("shared"), role("l"), role("r"), role("t")]);

        let plan = resolve(&registry, "top", &loader).unwrap();
        assert_eq!(vec!["shared", "l", "r", "t"], plan.roles());
    }

    #[test]
    fn loads_each_role_exactly_once() {
        let mut registry = TargetRegistry::new();
        registry.target("left").has_roles(["shared"]);
        registry.target("right").has_roles(["shared"]);
        registry.target("top").depends_on(["left", "right"]);
        let loader = MapLoader::new([role("shared")]);

        resolve(&registry, "top", &loader).unwrap();
        assert_eq!(vec!["shared".to_string()], loader.loads());
    }

    #[test]
    fn shared_dependencies_are_traversed_once() {
        // left and right both depend on base; base's role must appear once, under the first
        // completed traversal.
        let mut registry = TargetRegistry::new();
        registry.target("base").has_roles(["b"]);
        registry.target("left").depends_on(["base"]).has_roles(["l"]);
        registry.target("right").depends_on(["base"]).has_roles(["r"]);
        registry.target("top").depends_on(["left", "right"]);
        let loader = MapLoader::new([role("b"), role("l"), role("r")]);

        let plan = resolve(&registry, "top", &loader).unwrap();
        assert_eq!(vec!["b", "l", "r"], plan.roles());
    }

    #[test]
    fn compiles_role_vars_into_resources() {
        let mut registry = TargetRegistry::new();
        registry.target("solo").has_roles(["tools"]);

        let tools = Role {
            source: None,
            name: "tools".to_string(),
            vars: IndexMap::from([("pkg".to_string(), "git".to_string())]),
            resources: vec![Resource::Package {
                name: "$pkg".to_string(),
            }],
        };
        let loader = MapLoader::new([tools]);

        let plan = resolve(&registry, "solo", &loader).unwrap();
        let step = &plan.steps()[0];
        assert_eq!(
            Resource::Package {
                name: "git".to_string(),
            },
            step.resource,
        );
        assert_eq!(Some("git"), step.vars.get("pkg").map(String::as_str));
    }

    #[test]
    fn unknown_selected_target_is_an_error() {
        let registry = fixtures::registry();
        let loader = MapLoader::empty();

        let err = resolve(&registry, "ghost", &loader).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownTarget { name } if name == "ghost"));
    }

    #[test]
    fn unknown_dependency_is_an_error() {
        let mut registry = TargetRegistry::new();
        registry.target("top").depends_on(["ghost"]);
        let loader = MapLoader::empty();

        let err = resolve(&registry, "top", &loader).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownTarget { name } if name == "ghost"));
    }

    #[test]
    fn unknown_role_is_an_error() {
        let mut registry = TargetRegistry::new();
        registry.target("top").has_roles(["ghost"]);
        let loader = MapLoader::empty();

        let err = resolve(&registry, "top", &loader).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnknownRole { target, role } if target == "top" && role == "ghost"
        ));
    }

    #[test]
    fn load_failures_propagate() {
        struct FailingLoader;
        impl RoleLoader for FailingLoader {
            fn load(&self, name: &str) -> Result<Role, LoadError> {
                Err(LoadError::NameMismatch {
                    expected: name.to_string(),
                    found: "other".to_string(),
                })
            }
        }

        let mut registry = TargetRegistry::new();
        registry.target("top").has_roles(["r"]);

        let err = resolve(&registry, "top", &FailingLoader).unwrap_err();
        assert!(matches!(err, ResolveError::Load(LoadError::NameMismatch { .. })));
    }

    #[test]
    fn reports_the_full_cycle_path() {
        let mut registry = TargetRegistry::new();
        registry.target("a").depends_on(["b"]);
        registry.target("b").depends_on(["c"]);
        registry.target("c").depends_on(["a"]);
        let loader = MapLoader::empty();

        let err = resolve(&registry, "a", &loader).unwrap_err();
        match err {
            ResolveError::Cycle { path } => {
                assert_eq!(vec!["a", "b", "c", "a"], path);
            }
            err => panic!("expected cycle, got: {err:?}"),
        }
    }

    #[test]
    fn detects_self_cycles() {
        let mut registry = TargetRegistry::new();
        registry.target("a").depends_on(["a"]);
        let loader = MapLoader::empty();

        let err = resolve(&registry, "a", &loader).unwrap_err();
        match err {
            ResolveError::Cycle { path } => assert_eq!(vec!["a", "a"], path),
            err => panic!("expected cycle, got: {err:?}"),
        }
    }

    #[test]
    fn cycle_error_message_shows_the_path() {
        let err = ResolveError::Cycle {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!("dependency cycle: a -> b -> a", err.to_string());
    }

    #[test]
    fn cycle_off_the_selected_path_is_still_detected() {
        // The cycle is in a dependency's subtree, not through the selected target itself.
        let mut registry = TargetRegistry::new();
        registry.target("top").depends_on(["a"]);
        registry.target("a").depends_on(["b"]);
        registry.target("b").depends_on(["a"]);
        let loader = MapLoader::empty();

        let err = resolve(&registry, "top", &loader).unwrap_err();
        match err {
            ResolveError::Cycle { path } => assert_eq!(vec!["a", "b", "a"], path),
            err => panic!("expected cycle, got: {err:?}"),
        }
    }

    #[test]
    fn steps_pair_roles_with_their_resources() {
        let registry = fixtures::registry();
        let git = fixtures::role("git");
        let shell = Role {
            source: None,
            name: "shell".to_string(),
            vars: IndexMap::new(),
            resources: vec![Resource::File {
                path: "~/.bashrc".to_string(),
                content: ContentSpec::HasLines(vec!["set -o vi".to_string()]),
                mode: None,
            }],
        };
        let loader = MapLoader::new([git, shell]);

        let plan = resolve(&registry, "workstation", &loader).unwrap();
        let pairs: Vec<(&str, String)> = plan
            .iter()
            .map(|step| (step.role.as_str(), step.resource.describe()))
            .collect();
        assert_eq!(
            vec![
                ("git", "package git".to_string()),
                ("git", "file ~/.gitignore".to_string()),
                ("shell", "file ~/.bashrc".to_string()),
            ],
            pairs,
        );
    }

    mod filter_roles {
        use super::*;

        fn plan() -> ResolvedPlan {
            let mut registry = TargetRegistry::new();
            registry.target("solo").has_roles(["a", "b", "c"]);
            let loader = MapLoader::new([role("a"), role("b"), role("c")]);
            resolve(&registry, "solo", &loader).unwrap()
        }

        #[test]
        fn limit_keeps_only_named_roles() {
            let plan = plan().filter_roles(Some(&["a", "c"]), &[]);
            assert_eq!(vec!["a", "c"], plan.roles());
        }

        #[test]
        fn skip_drops_named_roles() {
            let plan = plan().filter_roles(None, &["b"]);
            assert_eq!(vec!["a", "c"], plan.roles());
        }

        #[test]
        fn skip_wins_over_limit() {
            let plan = plan().filter_roles(Some(&["a", "b"]), &["b"]);
            assert_eq!(vec!["a"], plan.roles());
        }

        #[test]
        fn no_filters_keep_everything() {
            let plan = plan().filter_roles(None, &[]);
            assert_eq!(vec!["a", "b", "c"], plan.roles());
        }
    }
}
