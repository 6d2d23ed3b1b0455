use crate::config::ConfigError;
use crate::vars::VarError;

/// Errors surfaced by the physics core.
#[derive(thiserror::Error, Debug)]
pub enum PhysicsError {
    /// No factory is registered under this classname. This is a content bug.
    #[error("entity classname \"{0}\" is invalid")]
    UnknownClassname(String),

    #[error("could not find event \"{0}\"")]
    UnknownEvent(String),

    #[error(transparent)]
    Var(#[from] VarError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
