use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameGraphError {
    #[error("pass dependency cycle detected, involving: {passes}")]
    Cycle { passes: String },
    #[error("pass '{pass}' both reads and writes texture '{texture}' with no ordering between the two")]
    SelfDependency { pass: String, texture: String },
    #[error("pass '{pass}' survived culling but has no callback")]
    MissingCallback { pass: String },
    #[error("cannot alias texture '{a}' with '{b}': {reason}")]
    AliasMismatch { a: String, b: String, reason: String },
}
