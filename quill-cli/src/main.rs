use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use quill_core::loader::HOST_MODULE;
use quill_core::source::DEFAULT_PROFILE;
use quill_core::{
    HostMember, ScriptCompiler, ScriptContext, ScriptError, ScriptHost, ScriptLoader,
    ScriptSource,
};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use wasmi::Linker;

/// Compile and run quill scripts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present = "repl",
        conflicts_with = "repl"
    )]
    input: Option<PathBuf>,

    #[arg(
        short = 'C',
        long,
        value_name = "DIR",
        help = "Directory holding quill.deps.json (defaults to the script's directory, or the current directory for --repl)"
    )]
    working_dir: Option<PathBuf>,

    #[arg(long, value_name = "NAME", default_value = DEFAULT_PROFILE)]
    profile: String,

    #[arg(long, help = "Emit debug information into the compiled module")]
    debug: bool,

    #[arg(long, value_name = "OUT", help = "Write the compiled module to OUT")]
    emit_wasm: Option<PathBuf>,

    #[arg(long, help = "Run the script after compiling it")]
    run: bool,

    #[arg(long, help = "Read submissions from stdin, one per line")]
    repl: bool,

    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: Level,

    #[arg(long, help = "Emit logs as JSON lines")]
    json_logs: bool,
}

/// Host for command-line scripts: `print(x)` writes `x` to stdout and
/// returns it.
#[derive(Debug, Default)]
struct ConsoleHost;

impl ScriptHost for ConsoleHost {
    fn members() -> Vec<HostMember> {
        vec![HostMember::new("print", 1)]
    }

    fn link(linker: &mut Linker<Self>) -> Result<(), wasmi::Error> {
        linker.func_wrap(HOST_MODULE, "print", |value: i32| -> i32 {
            println!("{value}");
            value
        })?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.log_level);
    execute(cli)
}

/// Logs go to stderr so stdout carries only script output.
fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init()
            .ok();
    }
}

fn execute(cli: Cli) -> Result<()> {
    let compiler = ScriptCompiler::new();

    let Some(input) = cli.input else {
        let working_dir = match cli.working_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to determine the current directory")?,
        };
        return repl(&compiler, &working_dir, &cli.profile);
    };

    let source = ScriptSource::from_file(&input)
        .with_context(|| format!("failed to read input file {}", input.display()))?;
    let working_dir = cli
        .working_dir
        .unwrap_or_else(|| script_directory(&input));
    let context = ScriptContext::new(source, working_dir)
        .with_profile(cli.profile)
        .with_debug(cli.debug);

    let mut script = compiler
        .compile::<Option<i32>, ConsoleHost>(&context, ConsoleHost)
        .map_err(|err| anyhow::anyhow!(describe(&err)))?;
    for diagnostic in script.diagnostics() {
        eprintln!("{diagnostic}");
    }

    if let Some(path) = &cli.emit_wasm {
        write_output(path, script.wasm())?;
    }
    if cli.run {
        if let Some(value) = script.run()? {
            println!("{value}");
        }
    }
    Ok(())
}

fn script_directory(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Each line is one submission of the same session.
fn repl(compiler: &ScriptCompiler, working_dir: &Path, profile: &str) -> Result<()> {
    let mut loader = ScriptLoader::new(ConsoleHost)?;
    let interactive = io::stdin().is_terminal();

    let mut lines = io::stdin().lock().lines();
    loop {
        if interactive {
            print!("> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read from stdin")?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == ":quit" {
            break;
        }

        let context =
            ScriptContext::new(ScriptSource::new(text), working_dir).with_profile(profile);
        loader = match compiler.compile_submission::<Option<i32>, ConsoleHost>(&context, loader) {
            Ok(mut script) => {
                for diagnostic in script.diagnostics() {
                    eprintln!("{diagnostic}");
                }
                match script.run() {
                    Ok(Some(value)) => println!("{value}"),
                    Ok(None) => {}
                    Err(err) => eprintln!("{err}"),
                }
                script.into_loader()
            }
            Err(rejection) => {
                eprintln!("{}", describe(&rejection.error));
                rejection.loader
            }
        };
    }
    Ok(())
}

/// Compilation failures list every diagnostic under the summary line.
fn describe(error: &ScriptError) -> String {
    match error {
        ScriptError::Compilation(compilation) => compilation.report(),
        other => other.to_string(),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::{TempDir, tempdir};

    fn workspace_with(script: &str) -> (TempDir, PathBuf) {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("quill.deps.json"),
            r#"{ "profiles": { "debug": { "dependencies": [] } } }"#,
        )
        .expect("write manifest");
        let input_path = dir.path().join("main.qs");
        fs::write(&input_path, script).expect("write input");
        (dir, input_path)
    }

    #[test]
    fn compiles_and_runs_script() {
        let (_dir, input_path) = workspace_with("1+1");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--run")
            .assert()
            .success()
            .stdout("2\n");
    }

    #[test]
    fn emits_wasm_module() {
        let (dir, input_path) = workspace_with("int x = core.max(1, 2);\nx");
        let output_path = dir.path().join("out").join("main.wasm");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--emit-wasm")
            .arg(&output_path)
            .arg("--debug")
            .assert()
            .success();

        let bytes = fs::read(&output_path).expect("read wasm");
        assert!(bytes.starts_with(b"\0asm"), "not a wasm module");
    }

    #[test]
    fn host_print_writes_to_stdout() {
        let (_dir, input_path) = workspace_with("print(7);\nprint(8);");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--run")
            .assert()
            .success()
            .stdout("7\n8\n");
    }

    #[test]
    fn reports_compilation_errors() {
        let (_dir, input_path) = workspace_with("int x = ");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Script compilation failed due to one or more errors.",
            ))
            .stderr(predicate::str::contains("QS1011"));
    }

    #[test]
    fn reports_missing_manifest() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.qs");
        fs::write(&input_path, "1").expect("write input");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("no dependency manifest"));
    }

    #[test]
    fn working_dir_overrides_script_directory() {
        let (dir, _) = workspace_with("");
        let elsewhere = tempdir().expect("tempdir");
        let input_path = elsewhere.path().join("script.qs");
        fs::write(&input_path, "6 * 7").expect("write input");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--working-dir")
            .arg(dir.path())
            .arg("--run")
            .assert()
            .success()
            .stdout("42\n");
    }

    #[test]
    fn repl_chains_submissions() {
        let (dir, _) = workspace_with("");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--repl")
            .arg("--working-dir")
            .arg(dir.path())
            .write_stdin("int x = 40;\nx + 2\n:quit\nx\n")
            .assert()
            .success()
            .stdout("42\n");
    }

    #[test]
    fn repl_continues_after_a_rejected_line() {
        let (dir, _) = workspace_with("");

        Command::cargo_bin("quill")
            .expect("binary exists")
            .arg("--repl")
            .arg("--working-dir")
            .arg(dir.path())
            .write_stdin("nope\n1 + 1\n")
            .assert()
            .success()
            .stdout("2\n")
            .stderr(predicate::str::contains("QS0001"));
    }
}
