pub mod gui;
pub mod persistence;
pub mod tree_utils;
