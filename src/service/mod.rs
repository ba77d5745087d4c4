//! Mutation service and input validation.

mod mutation;
pub mod validate;

pub use mutation::MutationService;
