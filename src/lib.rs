//! Drive aider's interactive prompt as an async request/response API.
//!
//! ```no_run
//! # async fn demo() -> Result<(), aider_driver::DriverError> {
//! use aider_driver::{AiderProcess, StartOptions};
//!
//! let aider = AiderProcess::start(
//!     StartOptions::new("/tmp/proj").args(["--architect", "--map-refresh", "manual"]),
//! )
//! .await?;
//! let help = aider.send_and_wait("/help").await?;
//! println!("{help}");
//! aider.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod prompt;
pub mod session;
pub mod transcript;

pub use error::DriverError;
pub use prompt::PromptKind;
pub use session::process::{AiderProcess, Message, OutputStream, StartOptions};
pub use session::state::{SessionState, SessionStatus};
