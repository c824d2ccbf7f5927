//! Types for representing roles and loading their definitions.

use crate::core::resource::{ContentSpec, Resource};
use indexmap::IndexMap;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// A named, ordered bundle of resource assertions.
///
/// This type is typically parsed from a role file, but it can be constructed programmatically
/// as well.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Role {
    /// The file from which this value was parsed (if any).
    ///
    /// For instance, a role loaded from a file might set this to the path to the file. There is
    /// currently no standard value to place here for roles from other sources.
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// The [Role]'s name. Role names identify roles across the target graph: the same name
    /// reachable from several targets refers to one role, applied once.
    pub name: String,

    /// Role-level variables, substituted into the role's resources when a plan is resolved and
    /// passed as the context when a file template is rendered.
    ///
    /// Variables are stored as `(name, value)` tuples. Order is preserved from the source file;
    /// substitution happens in definition order.
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub vars: IndexMap<String, String>,

    /// The list of [Resource] assertions that comprise this role.
    ///
    /// Order is preserved from the source file and is significant: later assertions may depend
    /// on the side effects of earlier ones, e.g. a package must be installed before a file it
    /// owns is asserted.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub resources: Vec<Resource>,
}

impl Role {
    /// Returns this role's resources with [Self::vars] substituted into every string field.
    ///
    /// Substitution follows the rules of [substitute]. Resources are returned in declaration
    /// order.
    pub fn compiled_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .map(|resource| self.compile(resource))
            .collect()
    }

    fn compile(&self, resource: &Resource) -> Resource {
        let mut resource = resource.clone();

        for (var, value) in &self.vars {
            // Form a regular expression that matches $<var> (as a whole word) and ${<var>}
            // where <var> is the name of the variable.
            let pattern = format!(
                r"\${var}\b|\$\{{{var}}}",
                var = regex::escape(var)
            );
            let regex = Regex::new(&pattern).unwrap();

            // Build an ergonomic regex replacer so we can write DRY code below.
            let replace = |s: &mut String| {
                let _ = std::mem::replace(s, regex.replace_all(s, NoExpand(value)).into_owned());
            };

            // Run the replacement across all string fields of the resource.
            use Resource::*;
            match &mut resource {
                Package { name } => replace(name),
                File {
                    path,
                    content,
                    mode: _,
                } => {
                    replace(path);
                    match content {
                        ContentSpec::Content(text) => replace(text),
                        ContentSpec::Lines(lines) | ContentSpec::HasLines(lines) => {
                            lines.iter_mut().for_each(replace);
                        }
                        ContentSpec::Template(template) => replace(template),
                    }
                }
                Directory { path } => replace(path),
                Symlink { path, target } => {
                    replace(path);
                    replace(target);
                }
                Absent { path } => replace(path),
            }
        }
        resource
    }
}

/// Substitutes variables into `text`, returning the result.
///
/// There are two forms of variable substitution:
///
/// 1. Simple substitution (`$var`): any occurrence of `$var` is replaced with the variable named
///    `var`, if one exists. Matching works on word boundaries, so `$foobar.baz` matches the
///    variable `foobar` but not any of its substrings. To substitute `foo` there, use braced
///    substitution: `${foo}bar.baz`.
///
/// 2. Braced substitution (`${var}`): any occurrence of `${var}` is replaced with the variable
///    named `var`, if one exists.
///
/// If a variable does not exist, the text is left unchanged; substitution is not recursive.
/// Variables are substituted in the order in which they are defined. By relying on this
/// ordering, it is possible to use cascading substitutions to a limited degree, though this
/// generally is not recommended.
pub fn substitute(text: &str, vars: &IndexMap<String, String>) -> String {
    let mut text = text.to_string();
    for (var, value) in vars {
        let pattern = format!(r"\${var}\b|\$\{{{var}}}", var = regex::escape(var));
        let regex = Regex::new(&pattern).unwrap();
        text = regex.replace_all(&text, NoExpand(value)).into_owned();
    }
    text
}

/// Loads role definitions by name.
///
/// The core depends only on this contract: loading is deterministic for a given name within one
/// run, and failures propagate as typed [LoadError]s rather than crashing the run. How role
/// definitions are authored is the implementation's concern.
pub trait RoleLoader {
    /// Loads the role named `name`.
    fn load(&self, name: &str) -> Result<Role, LoadError>;
}

/// An error encountered while loading a role definition.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No definition exists for the requested role name.
    #[error("no definition found for role '{name}'")]
    NotFound { name: String },

    /// The definition exists but could not be read.
    #[error("failed to read definition for role '{name}'")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The definition could not be parsed.
    #[error("failed to parse definition for role '{name}'")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The definition parsed but declares a different role name than the one requested.
    #[error("role definition for '{expected}' names itself '{found}'")]
    NameMismatch { expected: String, found: String },
}

/// Loads roles from a directory tree: the role `name` is defined by `<root>/<name>/role.yaml`.
///
/// The role's directory may hold other files, e.g. the templates its file resources reference.
#[derive(Clone, Debug)]
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirLoader { root: root.into() }
    }
}

impl RoleLoader for DirLoader {
    fn load(&self, name: &str) -> Result<Role, LoadError> {
        let path = self.root.join(name).join("role.yaml");
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(err) => {
                return Err(LoadError::Read {
                    name: name.to_string(),
                    source: err,
                })
            }
        };

        let mut role: Role = serde_yaml::from_str(&text).map_err(|err| LoadError::Parse {
            name: name.to_string(),
            source: err,
        })?;

        if role.name != name {
            return Err(LoadError::NameMismatch {
                expected: name.to_string(),
                found: role.name,
            });
        }

        role.source = Some(path);
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    mod compile {
        use super::*;

        // Compiles a one-resource role without concerning the caller with the details. Returns
        // the package name after substitution.
        fn compile(vars: &[(&'static str, &'static str)], name: impl Into<String>) -> String {
            let vars = IndexMap::from_iter(
                vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            );
            let role = Role {
                source: None,
                name: "compile-tests".to_string(),
                vars,
                resources: vec![Resource::Package { name: name.into() }],
            };

            match role.compiled_resources().pop().unwrap() {
                Resource::Package { name } => name,
                resource => panic!("bug in test fixture. Unexpected resource: {resource:?}"),
            }
        }

        #[test]
        fn merges_vars() {
            assert_eq!("bar", compile(&[("foo", "bar")], "$foo"));
        }

        #[test]
        fn non_matching_vars_are_noop() {
            assert_eq!("noop", compile(&[("foo", "foo")], "noop"));
        }

        #[test]
        fn non_matching_substitutions_are_noop() {
            // Be sure to keep at least one variable so that the for loop runs.
            assert_eq!("$bar", compile(&[("foo", "foo")], "$bar"));
        }

        #[test]
        fn simple_substitution_works_at_end_of_string() {
            assert_eq!("foobar", compile(&[("foo", "bar")], "foo$foo"));
        }

        #[test]
        fn simple_substitution_does_not_match_var_substrings() {
            assert_eq!("$foobar", compile(&[("foo", "bar")], "$foobar"));
        }

        #[test]
        fn braced_substitution_works() {
            assert_eq!("barbar", compile(&[("foo", "bar")], "${foo}bar"));
        }

        #[test]
        fn merges_in_order() {
            assert_eq!(
                "done",
                compile(&[("1", "$2"), ("2", "$3"), ("3", "done")], "$1")
            );
        }

        #[test]
        fn works_on_all_resources() {
            let vars = IndexMap::from([("foo".to_string(), "bar".to_string())]);
            let role = Role {
                source: None,
                name: "compile-tests".to_string(),
                vars,
                resources: vec![
                    Resource::Package {
                        name: "$foo".to_string(),
                    },
                    Resource::File {
                        path: "$foo".to_string(),
                        content: ContentSpec::HasLines(vec!["$foo".to_string()]),
                        mode: None,
                    },
                    Resource::File {
                        path: "$foo".to_string(),
                        content: ContentSpec::Template("$foo".to_string()),
                        mode: None,
                    },
                    Resource::Directory {
                        path: "$foo".to_string(),
                    },
                    Resource::Symlink {
                        path: "$foo".to_string(),
                        target: "$foo".to_string(),
                    },
                    Resource::Absent {
                        path: "$foo".to_string(),
                    },
                ],
            };

            let expected = vec![
                Resource::Package {
                    name: "bar".to_string(),
                },
                Resource::File {
                    path: "bar".to_string(),
                    content: ContentSpec::HasLines(vec!["bar".to_string()]),
                    mode: None,
                },
                Resource::File {
                    path: "bar".to_string(),
                    content: ContentSpec::Template("bar".to_string()),
                    mode: None,
                },
                Resource::Directory {
                    path: "bar".to_string(),
                },
                Resource::Symlink {
                    path: "bar".to_string(),
                    target: "bar".to_string(),
                },
                Resource::Absent {
                    path: "bar".to_string(),
                },
            ];

            assert_eq!(expected, role.compiled_resources());
        }
    }

    mod substitute_fn {
        use super::*;

        #[test]
        fn substitutes_both_forms() {
            let vars = IndexMap::from([("user".to_string(), "archie".to_string())]);
            assert_eq!(
                "archie in /home/archie",
                substitute("$user in /home/${user}", &vars)
            );
        }

        #[test]
        fn leaves_unknown_vars_untouched() {
            let vars = IndexMap::from([("user".to_string(), "archie".to_string())]);
            assert_eq!("$PATH stays", substitute("$PATH stays", &vars));
        }
    }

    mod dir_loader {
        use super::*;

        fn write_role(root: &TempDir, name: &str, contents: &str) {
            let dir = root.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("role.yaml"), contents).unwrap();
        }

        #[test]
        fn loads_resources_in_file_order() {
            let root = TempDir::new().unwrap();
            write_role(
                &root,
                "git",
                "name: git\n\
                 vars:\n\
                 \x20 editor: vim\n\
                 resources:\n\
                 \x20 - package:\n\
                 \x20     name: git\n\
                 \x20 - file:\n\
                 \x20     path: ~/.gitignore\n\
                 \x20     has_lines:\n\
                 \x20       - .vscode\n",
            );

            let role = DirLoader::new(root.path()).load("git").unwrap();
            assert_eq!("git", role.name);
            assert_eq!(Some("vim"), role.vars.get("editor").map(String::as_str));
            assert_eq!(
                vec![
                    Resource::Package {
                        name: "git".to_string(),
                    },
                    Resource::File {
                        path: "~/.gitignore".to_string(),
                        content: ContentSpec::HasLines(vec![".vscode".to_string()]),
                        mode: None,
                    },
                ],
                role.resources,
            );
            assert_eq!(
                Some(root.path().join("git").join("role.yaml")),
                role.source,
            );
        }

        #[test]
        fn missing_role_is_not_found() {
            let root = TempDir::new().unwrap();
            let err = DirLoader::new(root.path()).load("ghost").unwrap_err();
            assert!(matches!(err, LoadError::NotFound { name } if name == "ghost"));
        }

        #[test]
        fn malformed_yaml_is_a_parse_error() {
            let root = TempDir::new().unwrap();
            write_role(&root, "bad", "name: bad\nresources: {not: [a, list");

            let err = DirLoader::new(root.path()).load("bad").unwrap_err();
            assert!(matches!(err, LoadError::Parse { name, .. } if name == "bad"));
        }

        #[test]
        fn mismatched_name_is_rejected() {
            let root = TempDir::new().unwrap();
            write_role(&root, "git", "name: got\nresources: []\n");

            let err = DirLoader::new(root.path()).load("git").unwrap_err();
            assert!(matches!(
                err,
                LoadError::NameMismatch { expected, found }
                    if expected == "git" && found == "got"
            ));
        }
    }
}
