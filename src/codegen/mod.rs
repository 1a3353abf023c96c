mod codegen;
mod ir;
mod render;

pub use codegen::*;
pub use ir::*;
