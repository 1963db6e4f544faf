use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{QueryClient, Session};

/// Behavioral flags as declared on a stage; `None` inherits the parent's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    /// Cancel the whole run when a query of this stage fails.
    pub abort_on_error: Option<bool>,
    /// Persist raw query output rows.
    pub save_output: Option<bool>,
    /// Persist raw query metadata (always done for failed queries).
    pub save_json: Option<bool>,
}

impl StageFlags {
    pub fn resolve(&self, parent: ResolvedFlags) -> ResolvedFlags {
        ResolvedFlags {
            abort_on_error: self.abort_on_error.unwrap_or(parent.abort_on_error),
            save_output: self.save_output.unwrap_or(parent.save_output),
            save_json: self.save_json.unwrap_or(parent.save_json),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedFlags {
    pub abort_on_error: bool,
    pub save_output: bool,
    pub save_json: bool,
}

/// One node of the benchmark graph: static configuration plus its work items.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub id: String,
    /// Catalog, schema and session params; inherited by descendants unless
    /// they start on a new client.
    pub session: Session,
    /// Create a fresh client for this stage instead of inheriting the parent's.
    /// The new client propagates to this stage's descendants.
    pub start_on_new_client: bool,
    pub flags: StageFlags,
    /// Inline queries, executed before `query_files`.
    pub queries: Vec<String>,
    pub query_files: Vec<PathBuf>,
    /// Where the run directory is created when this stage is the root.
    pub output_path: Option<PathBuf>,
}

impl Stage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_queries<I, S>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queries.extend(queries.into_iter().map(Into::into));
        self
    }

    pub fn with_query_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.query_files.push(path.into());
        self
    }

    pub fn with_flags(mut self, flags: StageFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Configuration a stage actually runs with, resolved once while preparing.
#[derive(Clone)]
pub struct EffectiveStage {
    pub client: Arc<dyn QueryClient>,
    pub flags: ResolvedFlags,
}

impl std::fmt::Debug for EffectiveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveStage")
            .field("session", self.client.session())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_inherit_from_parent() {
        let parent = ResolvedFlags {
            abort_on_error: true,
            save_output: false,
            save_json: true,
        };
        let flags = StageFlags {
            save_output: Some(true),
            save_json: Some(false),
            ..StageFlags::default()
        };

        assert_eq!(
            flags.resolve(parent),
            ResolvedFlags {
                abort_on_error: true,
                save_output: true,
                save_json: false,
            }
        );
    }
}
