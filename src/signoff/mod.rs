// ABOUTME: Commit sign-off workflow: cleanliness gate, status posting and branch protection
// Moves the CI verdict back to the developer machine using git and gh inside a sandbox

pub mod error;
pub mod session;

pub use error::SignoffError;
pub use session::{CleanState, Signoff};
