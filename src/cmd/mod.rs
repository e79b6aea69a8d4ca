//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled    |
//! |------------|---------------------|
//! | `generate` | `Generate`          |
//! | `export`   | `Export`            |
//! | `status`   | `Status`, `Reset`   |

pub mod export;
pub mod generate;
pub mod status;

pub use export::cmd_export;
pub use generate::cmd_generate;
pub use status::{cmd_reset, cmd_status};
