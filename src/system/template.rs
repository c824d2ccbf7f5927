//! The template rendering capability consumed by file resources with a template strategy.

use crate::core::role::substitute;
use indexmap::IndexMap;
use std::io;
use std::path::PathBuf;

/// Renders a named template with a variable context into the desired file content.
pub trait TemplateEngine {
    /// Renders the template identified by `template`. Rendering must be deterministic for a
    /// given template and context within one run.
    fn render(
        &self,
        template: &str,
        vars: &IndexMap<String, String>,
    ) -> Result<String, RenderError>;
}

/// An error encountered while rendering a template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template '{template}' not found")]
    NotFound { template: String },

    #[error("failed to read template '{template}'")]
    Read {
        template: String,
        #[source]
        source: io::Error,
    },
}

/// A [TemplateEngine] over a directory of template files.
///
/// A template reference is a path relative to the root, conventionally `<role>/<file>` when the
/// root is the roles directory. Rendering reads the file and substitutes variables with the
/// same rules used for role variable compilation ([substitute]); unknown variables are left
/// untouched, so literal `$` in rendered content survives.
#[derive(Clone, Debug)]
pub struct FileTemplates {
    root: PathBuf,
}

impl FileTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileTemplates { root: root.into() }
    }
}

impl TemplateEngine for FileTemplates {
    fn render(
        &self,
        template: &str,
        vars: &IndexMap<String, String>,
    ) -> Result<String, RenderError> {
        let path = self.root.join(template);
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RenderError::NotFound {
                    template: template.to_string(),
                })
            }
            Err(err) => {
                return Err(RenderError::Read {
                    template: template.to_string(),
                    source: err,
                })
            }
        };
        Ok(substitute(&text, vars))
    }
}
