pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod executor;
pub mod lexer;
pub mod parser;

use codegen::{GeneratedProgram, TranslationResult};
use config::RuntimeConfig;
use executor::{ExecutionOutput, Executor, InputSource};
use lexer::Lexer;
use parser::Parser;

/// Lexes, parses and translates pseudo-code. Either the whole program is
/// generated or only diagnostics come back.
pub fn submit(user_input: &str) -> TranslationResult {
    let tokens = Lexer::tokenize(user_input);

    let mut parser = Parser::new(tokens);
    let tree = parser.parse();

    codegen::translate(&tree)
}

/// Runs a translated program with no input available.
pub fn run(program: &GeneratedProgram) -> ExecutionOutput {
    Executor::new(RuntimeConfig::default()).run(program)
}

pub fn run_with_input(
    program: &GeneratedProgram,
    input: impl InputSource + 'static,
) -> ExecutionOutput {
    Executor::new(RuntimeConfig::default())
        .with_input(input)
        .run(program)
}
