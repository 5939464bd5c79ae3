pub mod buffer;
pub mod extract;
pub mod process;
pub mod state;
