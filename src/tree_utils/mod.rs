pub mod history;
pub mod ids;
pub mod layout;
pub mod projection;
pub mod tree;
