//! Declarative local machine configuration.
//!
//! # Targets, roles, and resources
//!
//! A **target** is a machine profile: it depends on other targets and carries a list of **roles**.
//! A role is a named, ordered bundle of **resource** assertions, e.g. "package `git` is
//! installed" or "`~/.gitignore` contains these lines". Role definitions live in role files; you
//! can think of them in whatever terms work for you, e.g. playbooks, profiles, etc.
//!
//! # Program flow
//!
//! 1. The caller (a configuration script, or anything else that can drive the API) declares
//!    targets in a [TargetRegistry], wiring up dependencies and role assignments.
//!
//! 2. [resolve] walks the dependency graph from a selected target and produces a
//!    [ResolvedPlan]: the ordered, de-duplicated sequence of resources to assert. Roles are
//!    loaded through a [RoleLoader] at this stage, and any structural problem (unknown name,
//!    dependency cycle, unloadable role) aborts here, before anything on the machine is touched.
//!
//! 3. [converge] runs the plan against a [Host], the bundle of filesystem, package manager,
//!    and template rendering capabilities: each resource is probed, its actual state is diffed
//!    against the desired state, and the minimal change is applied. Each resource yields
//!    exactly one [ActionRecord], collected into a [Report].
//!
//! Rendering the report, parsing command-line arguments, and executing user scripts are the
//! caller's concern; this crate is the resolution and convergence core.
//!
//! [TargetRegistry]: core::TargetRegistry
//! [RoleLoader]: core::role::RoleLoader
//! [ResolvedPlan]: resolve::ResolvedPlan
//! [Host]: system::Host
//! [ActionRecord]: converge::ActionRecord
//! [Report]: converge::Report

pub mod converge;
pub mod core;
pub mod resolve;
pub mod system;

#[doc(inline)]
pub use converge::{converge, Report};

#[doc(inline)]
pub use resolve::{resolve, ResolvedPlan};
