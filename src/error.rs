use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A handle that was never issued by this simulator, or whose agent was
    /// removed.
    #[error("unknown {kind} identifier {index}")]
    InvalidIdentifier { kind: &'static str, index: usize },

    #[error("obstacles were added but not processed; call process_obstacles() first")]
    ObstaclesNotProcessed,

    #[error("degenerate obstacle geometry: {0}")]
    DegenerateGeometry(String),

    #[error("expected a vector with {expected} components, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("`{name}` must be finite")]
    NonFinite { name: &'static str },

    #[error("invalid value {value} for `{name}`")]
    InvalidParameter { name: &'static str, value: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
