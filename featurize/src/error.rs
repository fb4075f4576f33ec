use thiserror::Error;

use geometry::ShapeMismatch;

// Failure taxonomy of the featurization pipeline. Every error is a
// deterministic function of configuration or input shape and is raised
// before (or at the entry of) the batch loop; there is no partial-batch
// recovery. Numeric degeneracies in the spline tables are not errors, they
// are coerced to zero contributions at table build time.
#[derive(Debug, Error)]
pub enum FeaturizeError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),

    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("interaction not found: {0}")]
    InteractionNotFound(String),
}
