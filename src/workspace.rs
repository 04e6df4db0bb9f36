//! The tree being maintained: its root, configuration and parser.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Error;
use crate::parser::Parser;
use crate::paths;
use crate::rewriter;
use crate::types::Reference;

/// Root, configuration and parser, shared by the scanner, the orchestrator
/// and event ingress.
#[derive(Debug)]
pub struct Workspace {
    /// Effective configuration.
    config: Config,
    /// Project-relative path of the log file, when it lives inside the tree.
    log_file: Option<String>,
    /// Link parser configured from `config`.
    parser: Parser,
    /// Absolute, canonical project root.
    root: PathBuf,
}

impl Workspace {
    /// The effective configuration.
    pub const fn config(&self) -> &Config {
        return &self.config;
    }

    /// Whether a project-relative path is excluded from scans and events.
    pub fn is_ignored(&self, relative: &str) -> bool {
        return self.config.is_ignored(relative, self.log_file.as_deref());
    }

    /// Whether a project-relative path is a file we parse for references.
    pub fn is_monitored(&self, relative: &str) -> bool {
        return !self.is_ignored(relative) && self.config.is_monitored(relative);
    }

    /// Bind a configuration to a root directory. `root` should already be
    /// absolute and canonical; event paths are stripped against it.
    pub fn new(root: PathBuf, config: Config) -> Self {
        let log_file = config.log_file.as_deref().and_then(|log| {
            if log.is_absolute() {
                return paths::to_project_relative(&root, log);
            }
            return log.to_str().map(paths::normalize);
        });
        let parser = Parser::new(&config);
        return Self {
            config,
            log_file,
            parser,
            root,
        };
    }

    /// Read and parse one project-relative file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound`, `Error::InvalidUtf8` (unless lossy
    /// decoding is on), or `Error::Io` if the file cannot be read.
    pub fn parse_file(&self, relative: &str) -> Result<Vec<Reference>, Error> {
        let content = rewriter::read_text(&self.root.join(relative), self.config.lossy_utf8)?;
        return Ok(self.parser.parse(relative, &content));
    }

    /// Project-relative form of an absolute path under the root.
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        return paths::to_project_relative(&self.root, absolute);
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        return &self.root;
    }
}
