pub mod drag;
pub mod frontend;
