pub mod renderer;
pub mod theme;
