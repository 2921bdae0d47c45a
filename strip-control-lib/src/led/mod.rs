pub mod color;
pub mod function;
