pub mod ast;
mod compiler;
mod error;
pub mod explain;
mod formula_parser;
pub mod parse_utils;
pub mod plan;

pub use compiler::compile;
pub use error::FormulaError;
pub use explain::explain_plan;
pub use formula_parser::parse_formula;

/// Parse and compile formula text in one step.
pub fn compile_formula(src: &str) -> Result<plan::Plan, FormulaError> {
    compile(&parse_formula(src)?)
}
