use thiserror::Error;

/// The non-fatal outcomes of a lookup or removal that found nothing to act on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// No element compares equal to the requested value.
    #[error("value not found")]
    NotFound,
    /// The tree has no elements.
    #[error("tree is empty")]
    EmptyTree,
}
