//! MCP tool layer and the `gcal-mcp` command
//!
//! [`CalendarServer`] exposes [`CalendarTools`] over MCP. The tools get their
//! calendar client from a [`CalendarSession`], which is built once in `main`
//! and shared by `Arc`.

pub mod cli;
pub mod commands;
pub mod error;
pub mod params;
pub mod server;
pub mod session;
pub mod tools;

pub use cli::Cli;
pub use error::{AppError, AppResult};
pub use server::CalendarServer;
pub use session::CalendarSession;
pub use tools::{CalendarTools, ToolError, ToolResult};
