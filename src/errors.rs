// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IjError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unknown {kind} '{name}' referenced by '{referrer}'")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    #[error("task '{0}' has a cyclic extends chain")]
    CyclicExtends(String),

    #[error("task '{child}' ({child_kind}) cannot extend task '{parent}' ({parent_kind})")]
    MismatchedExtends {
        child: String,
        child_kind: &'static str,
        parent: String,
        parent_kind: &'static str,
    },

    #[error("config file '{0}' has a cyclic extends chain")]
    CyclicConfigExtends(String),

    #[error("'{0}' is declared as both a plan and a metaplan")]
    DuplicateName(String),

    #[error("cycle detected in metaplans involving '{0}'")]
    CyclicMetaplan(String),

    #[error("stage '{stage}' of plan '{plan}' overrides an existing stage and cannot also declare before_stage/after_stage")]
    AmbiguousStageOverride { plan: String, stage: String },

    #[error("stage '{stage}' of plan '{plan}' is anchored to undeclared stage '{anchor}'")]
    StageNotDeclared {
        plan: String,
        stage: String,
        anchor: String,
    },

    #[error("stage '{stage}' of plan '{plan}' declares both before_stage and after_stage")]
    StageAnchorConflict { plan: String, stage: String },

    #[error("environment expansion did not converge: {0}")]
    ExpansionOverflow(String),

    #[error("missing required environment: {}", .0.join(", "))]
    MissingEnvironment(Vec<String>),

    #[error("maximum plan call depth exceeded at '{0}'")]
    MaxCallDepth(String),

    #[error("{0}")]
    Execution(String),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IjError {
    /// Errors raised while loading and resolving configuration, before any
    /// resource is acquired.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IjError::Config(_)
                | IjError::UnknownReference { .. }
                | IjError::CyclicExtends(_)
                | IjError::MismatchedExtends { .. }
                | IjError::CyclicConfigExtends(_)
                | IjError::DuplicateName(_)
                | IjError::CyclicMetaplan(_)
                | IjError::AmbiguousStageOverride { .. }
                | IjError::StageNotDeclared { .. }
                | IjError::StageAnchorConflict { .. }
                | IjError::TomlError(_)
                | IjError::YamlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, IjError>;
