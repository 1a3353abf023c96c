use std::{fs, process::ExitCode, time::Duration};

use anyhow::Result;
use clap::{Parser as ClapParser, Subcommand};
use clap_stdin::FileOrStdin;
use log::info;

use pseudocc::{
    codegen::{Codegen, TranslationResult},
    config::{
        CodegenConfig, RuntimeConfig, DEFAULT_INDENT_WIDTH, DEFAULT_MAX_CALL_DEPTH,
        DEFAULT_MAX_STEPS, DEFAULT_TIME_LIMIT_MS,
    },
    diagnostics,
    executor::{ExecutionOutput, Executor},
    lexer::Lexer,
    parser::Parser,
};

#[derive(ClapParser)]
#[command(name = "pseudocc")]
#[command(about = "Translate and run Spanish pseudo-code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the token stream
    Tokens {
        /// Source file, `-` or nothing for stdin
        #[arg(default_value = "-")]
        source: FileOrStdin,
    },
    /// Print the generated program
    Translate {
        #[arg(default_value = "-")]
        source: FileOrStdin,

        /// Spaces per indentation level
        #[arg(long, default_value_t = DEFAULT_INDENT_WIDTH)]
        indent: usize,
    },
    /// Translate and execute
    Run {
        #[arg(default_value = "-")]
        source: FileOrStdin,

        /// File whose lines answer `LEER`
        #[arg(short, long)]
        input: Option<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: u64,

        #[arg(long, default_value_t = DEFAULT_TIME_LIMIT_MS)]
        timeout_ms: u64,

        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_call_depth: usize,
    },
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Tokens { source } => {
            let source = source.contents()?;
            for token in Lexer::tokenize(&source) {
                println!(
                    "{}\t{:?}\t{:?}",
                    token.position,
                    token.kind.category(),
                    token.kind
                );
            }
            true
        }
        Command::Translate { source, indent } => {
            let source = source.contents()?;
            let config = CodegenConfig {
                indent_width: indent,
            };
            match translate(&source, config) {
                Some(generated) => {
                    print!("{generated}");
                    true
                }
                None => false,
            }
        }
        Command::Run {
            source,
            input,
            max_steps,
            timeout_ms,
            max_call_depth,
        } => {
            let source = source.contents()?;
            let config = RuntimeConfig {
                max_steps,
                time_limit: Duration::from_millis(timeout_ms),
                max_call_depth,
            };
            let input_lines = match input {
                Some(path) => fs::read_to_string(path)?
                    .lines()
                    .map(str::to_string)
                    .collect(),
                None => vec![],
            };
            run(&source, config, input_lines)
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn translate_program(source: &str, config: CodegenConfig) -> TranslationResult {
    let tokens = Lexer::tokenize(source);
    let tree = Parser::new(tokens).parse();
    Codegen::new(config).translate(&tree)
}

fn report_diagnostics(source: &str, result: &TranslationResult) {
    for error in &result.diagnostics {
        eprint!("{}", diagnostics::render_parse_error(source, error));
    }
}

fn translate(source: &str, config: CodegenConfig) -> Option<String> {
    let result = translate_program(source, config);
    report_diagnostics(source, &result);
    result.generated.map(|g| g.source)
}

fn run(source: &str, config: RuntimeConfig, input_lines: Vec<String>) -> bool {
    let result = translate_program(source, CodegenConfig::default());
    report_diagnostics(source, &result);
    let Some(program) = result.generated else {
        return false;
    };

    info!("running with {} input lines", input_lines.len());
    let output = Executor::new(config)
        .with_input(input_lines.into_iter())
        .run(&program);
    for line in output.lines() {
        println!("{line}");
    }

    match output {
        ExecutionOutput::Completed(_) => true,
        ExecutionOutput::Failed { failure, .. } => {
            eprint!("{}", diagnostics::render_failure(source, &failure));
            false
        }
    }
}
