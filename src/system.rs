//! Capabilities through which resources touch the machine.
//!
//! Every side effect in a convergence run flows through one of three traits: [Filesystem],
//! [PackageManager], or [TemplateEngine]. The engine and the resources depend only on the
//! traits; real implementations ([fs::LocalFs], [pkg::Pacman], [template::FileTemplates]) live
//! beside them, and tests substitute in-memory fakes.
//!
//! [Filesystem]: fs::Filesystem
//! [PackageManager]: pkg::PackageManager
//! [TemplateEngine]: template::TemplateEngine

pub mod fs;
pub mod pkg;
pub mod template;

use self::fs::Filesystem;
use self::pkg::PackageManager;
use self::template::TemplateEngine;

/// The machine being converged, as a bundle of capabilities.
///
/// The bundle borrows its capabilities so that callers can keep ownership (and, in tests,
/// inspect the fakes after a run).
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub fs: &'a dyn Filesystem,
    pub packages: &'a dyn PackageManager,
    pub templates: &'a dyn TemplateEngine,
}

impl<'a> Host<'a> {
    pub fn new(
        fs: &'a dyn Filesystem,
        packages: &'a dyn PackageManager,
        templates: &'a dyn TemplateEngine,
    ) -> Self {
        Host {
            fs,
            packages,
            templates,
        }
    }
}
