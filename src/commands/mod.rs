//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `init` - Create an empty firmware database
//! - `query` - Query installers and merge or print the results
//! - `render` - Render a database as an indented report

pub mod init;
pub mod query;
pub mod render;

pub use init::cmd_init;
pub use query::cmd_query;
pub use render::cmd_render;
