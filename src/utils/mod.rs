//! The `utils` module holds the pieces shared by the library and the binary:
//! the top-level error type and logging setup.

pub mod error;
pub mod logging;
