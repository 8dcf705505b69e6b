use std::fmt;
use std::path::PathBuf;

use minijinja::{path_loader, Environment, ErrorKind};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TemplatesConfig;
use crate::error::DispatchError;

/// Renders the first template of `names` that exists.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, names: &[String], context: &Value) -> Result<String, DispatchError>;
}

/// Templates shipped with the crate, used when no search path provides them.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "scaffolding/layout.html",
        include_str!("../../templates/scaffolding/layout.html"),
    ),
    (
        "scaffolding/_form.html",
        include_str!("../../templates/scaffolding/_form.html"),
    ),
    (
        "scaffolding/list.html",
        include_str!("../../templates/scaffolding/list.html"),
    ),
    (
        "scaffolding/view.html",
        include_str!("../../templates/scaffolding/view.html"),
    ),
    (
        "scaffolding/add.html",
        include_str!("../../templates/scaffolding/add.html"),
    ),
    (
        "scaffolding/edit.html",
        include_str!("../../templates/scaffolding/edit.html"),
    ),
];

/// [`TemplateEngine`] backed by minijinja.
///
/// Templates are looked up in the configured directories in order, then in
/// the built-in scaffolding set. Templates added with
/// [`MiniJinjaEngine::add_template`] take precedence over both.
pub struct MiniJinjaEngine {
    env: Environment<'static>,
    paths: Vec<PathBuf>,
}

impl fmt::Debug for MiniJinjaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniJinjaEngine")
            .field("paths", &self.paths)
            .finish()
    }
}

impl MiniJinjaEngine {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        let loaders: Vec<_> = paths.iter().cloned().map(path_loader).collect();
        let mut env = Environment::new();
        env.set_loader(move |name| {
            for loader in &loaders {
                if let Some(source) = loader(name)? {
                    return Ok(Some(source));
                }
            }
            Ok(BUILTIN_TEMPLATES
                .iter()
                .find(|(builtin, _)| *builtin == name)
                .map(|(_, source)| source.to_string()))
        });
        Self { env, paths }
    }

    pub fn from_config(config: &TemplatesConfig) -> Self {
        Self::new(config.paths.iter().cloned())
    }

    /// Register an in-memory template.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| {
                warn!(template = %name, error = %e, "Invalid template");
                DispatchError::Template(e.to_string())
            })
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn render(&self, names: &[String], context: &Value) -> Result<String, DispatchError> {
        for name in names {
            match self.env.get_template(name) {
                Ok(template) => {
                    debug!(template = %name, "Rendering template");
                    return template
                        .render(context)
                        .map_err(|e| DispatchError::Template(format!("{name}: {e}")));
                }
                Err(e) if e.kind() == ErrorKind::TemplateNotFound => continue,
                Err(e) => return Err(DispatchError::Template(format!("{name}: {e}"))),
            }
        }
        Err(DispatchError::Template(format!(
            "none of the templates exist: {}",
            names.join(", ")
        )))
    }
}
