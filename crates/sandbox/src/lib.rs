mod environment;
mod error;
mod types;

pub use environment::SandboxEnvironment;
pub use error::{Result, SandboxError};
pub use types::{ExecOutcome, ExecRequest};
