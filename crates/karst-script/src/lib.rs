//! # karst-script
//! Script verification engine: rule flags, signature hashing, and the
//! stack-machine interpreter.

pub mod error;
pub mod flags;
pub mod interpreter;
pub mod sighash;

pub use error::ScriptVerifyError;
pub use interpreter::verify_script;
