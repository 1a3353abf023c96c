use std::time::Duration;

use pseudocc::codegen::GeneratedProgram;
use pseudocc::config::RuntimeConfig;
use pseudocc::executor::*;
use pseudocc::parser::*;
use pseudocc::{run, run_with_input, submit};

fn generate(input: &str) -> GeneratedProgram {
    let result = submit(input);
    let Some(generated) = result.generated else {
        panic!("{:?}", result.diagnostics);
    };
    generated
}

fn output_of(input: &str) -> Vec<String> {
    let ExecutionOutput::Completed(lines) = run(&generate(input)) else {
        panic!();
    };
    lines
}

fn failure_of(input: &str) -> RuntimeFailure {
    let ExecutionOutput::Failed { failure, .. } = run(&generate(input)) else {
        panic!();
    };
    failure
}

fn lines(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_hello() {
    let generated = generate("INICIO\n ESCRIBIR \"hola\"\nFIN");
    assert!(generated.source.contains("escribir(\"hola\")"));
    assert_eq!(run(&generated), ExecutionOutput::Completed(lines(&["hola"])));
}

#[test]
fn test_top_level_for() {
    assert_eq!(
        output_of("DESDE I <- 1 HASTA 3\n ESCRIBIR I\nFIN"),
        lines(&["1", "2", "3"])
    );
}

#[test]
fn test_loose_prints_without_main() {
    assert_eq!(output_of("ESCRIBIR \"hola\"\nx <- 1\nESCRIBIR x"), lines(&[]));
}

#[test]
fn test_do_while_runs_once() {
    let input = "INICIO
  x <- 10
  HACER
    ESCRIBIR x
    x <- x + 1
  MIENTRAS x < 3
FIN";
    assert_eq!(output_of(input), lines(&["10"]));
}

#[test]
fn test_do_while_with_nested_while() {
    let input = "INICIO
  i <- 0
  HACER
    j <- 0
    MIENTRAS j < 2 HACER
      j <- j + 1
    FIN_MIENTRAS
    i <- i + j
  MIENTRAS i < 5
  ESCRIBIR i
FIN";
    assert_eq!(output_of(input), lines(&["6"]));
}

#[test]
fn test_unclosed_block() {
    let result = submit("INICIO\n DESDE i <- 1 HASTA 3\n  ESCRIBIR i\nFIN");
    assert!(result.generated.is_none());
    assert_eq!(result.diagnostics.len(), 1);
    let SyntaxErrorKind::UnclosedBlock { construct, .. } = &result.diagnostics[0].kind else {
        panic!();
    };
    assert_eq!(construct, "INICIO");
}

#[test]
fn test_unexpected_token() {
    let result = submit("INICIO\n x <- * 2\nFIN");
    assert!(result.generated_source().is_none());
    assert_eq!(
        result.diagnostics[0].kind,
        SyntaxErrorKind::UnexpectedToken
    );
    assert_eq!(result.diagnostics[0].position.line, 2);
}

#[test]
fn test_division_by_zero() {
    let input = "INICIO
  a <- 4
  b <- 0
  ESCRIBIR a / b
FIN";
    let failure = failure_of(input);
    assert_eq!(failure.kind, FailureKind::DivisionByZero);
    assert_eq!(failure.position.line, 4);
}

#[test]
fn test_output_before_failure_is_kept() {
    let ExecutionOutput::Failed { lines: printed, failure } =
        run(&generate("INICIO\n ESCRIBIR 1\n ESCRIBIR z\nFIN"))
    else {
        panic!();
    };
    assert_eq!(printed, lines(&["1"]));
    assert_eq!(failure.kind, FailureKind::UndefinedVariable);
}

#[test]
fn test_translation_is_deterministic() {
    let input = "REGISTRO Punto
  x, z: REAL
FIN
FUNCION doble(n: ENTERO): ENTERO
  RETORNAR n * 2
FIN
INICIO
  CASO doble(2) SEA
    4: ESCRIBIR \"cuatro\"
    OTRO: ESCRIBIR \"otro\"
  FIN_CASO
FIN";
    assert_eq!(submit(input), submit(input));
}

#[test]
fn test_swap_by_reference() {
    let input = "PROCEDIMIENTO intercambiar(ES a: ENTERO, ES b: ENTERO)
  aux: ENTERO
  aux <- a
  a <- b
  b <- aux
FIN_PROCEDIMIENTO

INICIO
  x <- 1
  z <- 2
  LLAMAR intercambiar(x, z)
  ESCRIBIR x, z
FIN";
    assert_eq!(output_of(input), lines(&["2 1"]));
}

#[test]
fn test_by_value_is_a_copy() {
    let input = "PROCEDIMIENTO cambiar(a: ENTERO)
  a <- 99
FIN
INICIO
  x <- 1
  cambiar(x)
  ESCRIBIR x
FIN";
    assert_eq!(output_of(input), lines(&["1"]));
}

#[test]
fn test_recursive_function() {
    let input = "FUNCION fib(n: ENTERO): ENTERO
  SI n < 2 ENTONCES
    RETORNAR n
  FIN_SI
  RETORNAR fib(n - 1) + fib(n - 2)
FIN_FUNCION

INICIO
  DESDE i <- 0 HASTA 6
    ESCRIBIR fib(i)
  FIN_DESDE
FIN";
    assert_eq!(
        output_of(input),
        lines(&["0", "1", "1", "2", "3", "5", "8"])
    );
}

#[test]
fn test_records() {
    let input = "TIPO Alumno = REGISTRO
  nombre: CADENA
  nota: REAL
FIN_TIPO

INICIO
  a: Alumno
  a.nombre <- \"Ana\"
  a.nota <- 7
  ESCRIBIR a.nombre, a.nota, a
FIN";
    assert_eq!(
        output_of(input),
        lines(&["Ana 7 Alumno(nombre=Ana, nota=7)"])
    );
}

#[test]
fn test_read_input() {
    let input = "INICIO
  n: ENTERO
  LEER n
  suma <- 0
  DESDE i <- 1 HASTA n
    LEER x
    suma <- suma + x
  FIN_DESDE
  ESCRIBIR \"suma:\", suma
FIN";
    let generated = generate(input);
    let output = run_with_input(&generated, lines(&["3", "10", "20", "12"]).into_iter());
    assert_eq!(output, ExecutionOutput::Completed(lines(&["suma: 42"])));

    let output = run_with_input(&generated, lines(&["3", "10"]).into_iter());
    let Some(failure) = output.failure() else {
        panic!();
    };
    assert_eq!(failure.kind, FailureKind::InputExhausted);
    assert_eq!(failure.position.line, 6);
}

#[test]
fn test_read_without_input() {
    assert_eq!(
        failure_of("INICIO\n LEER x\nFIN").kind,
        FailureKind::InputExhausted
    );
}

#[test]
fn test_infinite_loop_times_out() {
    let config = RuntimeConfig {
        max_steps: 10_000,
        time_limit: Duration::from_secs(30),
        max_call_depth: 50,
    };
    let output = Executor::new(config).run(&generate("INICIO\n MIENTRAS 1 = 1\n FIN\nFIN"));
    assert_eq!(output.failure().map(|f| f.kind), Some(FailureKind::Timeout));
}

#[test]
fn test_case() {
    let input = "INICIO
  DESDE dia <- 1 HASTA 4
    CASO dia SEA
      1, 2: ESCRIBIR \"laborable\"
      3: ESCRIBIR \"medio\"
      SI_NO: ESCRIBIR \"finde\"
    FIN_CASO
  FIN_DESDE
FIN";
    assert_eq!(
        output_of(input),
        lines(&["laborable", "laborable", "medio", "finde"])
    );
}

#[test]
fn test_if_else_chain() {
    let input = "FUNCION signo(n: ENTERO): CADENA
  SI n > 0 ENTONCES
    RETORNAR \"positivo\"
  SI_NO
    SI n < 0 ENTONCES
      RETORNAR \"negativo\"
    FIN_SI
  FIN_SI
  RETORNAR \"cero\"
FIN

INICIO
  ESCRIBIR signo(5), signo(-5), signo(0)
FIN";
    assert_eq!(output_of(input), lines(&["positivo negativo cero"]));
}

#[test]
fn test_case_insensitive_keywords() {
    assert_eq!(
        output_of(
            "inicio\n escribir 'a' + \"b\"\n si verdadero y no falso entonces\n  escribir 1\n fin_si\nfin"
        ),
        lines(&["ab", "1"])
    );
}

#[test]
fn test_print_after_parenthesized_argument() {
    let input = "INICIO
  x <- 1
  ESCRIBIR (x), 2
  ESCRIBIR (x + 1) * 2, \"fin\"
FIN";
    assert_eq!(output_of(input), lines(&["1 2", "4 fin"]));
}

#[test]
fn test_deep_recursion_within_the_default_limit() {
    let input = "FUNCION suma(n: ENTERO): ENTERO
  SI n = 0 ENTONCES
    RETORNAR 0
  SI_NO
    MIENTRAS n > 0 HACER
      RETORNAR n + suma(n - 1)
    FIN_MIENTRAS
  FIN_SI
FIN_FUNCION

INICIO
  ESCRIBIR suma(198)
FIN";
    assert_eq!(output_of(input), lines(&["19701"]));

    let failure = failure_of(&input.replace("suma(198)", "suma(500)"));
    assert_eq!(failure.kind, FailureKind::CallDepthExceeded);
    assert_eq!(failure.position.line, 6);
}

#[test]
fn test_reals_keep_a_decimal() {
    assert_eq!(
        output_of("INICIO\n ESCRIBIR 1.0 * 10000000000000000, 1 / 10000000\nFIN"),
        lines(&["10000000000000000.0 0.0000001"])
    );
}

#[test]
fn test_doubling_text_overflows() {
    let input = "INICIO
  s <- \"x\"
  MIENTRAS VERDADERO HACER
    s <- s + s
  FIN_MIENTRAS
FIN";
    assert_eq!(failure_of(input).kind, FailureKind::Overflow);
}

#[test]
fn test_top_level_return_skips_main() {
    let input = "SI VERDADERO ENTONCES
  ESCRIBIR \"antes\"
  RETORNAR
FIN_SI
INICIO
  ESCRIBIR \"principal\"
FIN";
    let generated = generate(input);
    assert!(generated.source.contains("    raise SystemExit\n"));
    assert_eq!(run(&generated), ExecutionOutput::Completed(lines(&["antes"])));
}
