//! Hinoki CLI - コマンドラインインターフェース
//!
//! 命令セットシミュレータ用の簡易デバッガ hinoki のREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand};
use hinoki_core::check::run_cases;
use hinoki_core::command::COMMANDS;
use hinoki_core::{Command, Debugger, ExecState, ExpressionEvaluator, InfoTarget, StepOutcome};
use hinoki_target::memory::DEFAULT_MEMORY_SIZE;
use hinoki_target::Machine;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Hinoki - Simple Debugger for an Instruction-Set Simulator
#[derive(Parser)]
#[command(name = "hinoki")]
#[command(version = "0.1.0")]
#[command(about = "Expression evaluator and watchpoints for a simulated CPU", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Load an image and start the debugger
    Run {
        /// Raw binary image loaded at the start of physical memory
        image: Option<PathBuf>,

        /// Run the program to completion without the REPL
        #[arg(short, long)]
        batch: bool,

        /// Physical memory size in bytes
        #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
        mem_size: usize,
    },

    /// Check expressions against expected values ("EXPECTED EXPR" per line)
    Check {
        /// Path to the test case file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        DebugCommand::Run { image, batch, mem_size } => {
            println!("Hinoki - Simple Debugger");
            println!("Version 0.1.0");
            println!();

            let mut debugger = init_debugger(image, mem_size)?;
            if batch {
                handle_execution(&mut debugger, None);
            } else {
                run_repl(&mut debugger)?;
            }

            if is_exit_status_bad(&debugger) {
                std::process::exit(1);
            }
        }
        DebugCommand::Check { file } => {
            if !run_check(&file)? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// ログ出力を初期化する
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// マシンを作成してイメージを読み込む
fn init_debugger(image: Option<PathBuf>, mem_size: usize) -> Result<Debugger> {
    let mut machine = Machine::new(mem_size);
    let memory = machine.memory();
    println!(
        "Physical memory area [0x{:08x}, 0x{:08x}]",
        memory.base(),
        memory.base().wrapping_add(memory.size().saturating_sub(1) as u32)
    );

    match image {
        Some(path) => {
            println!("Loading image: {}", path.display());
            let size = machine.load_image(&path)?;
            println!("Loaded {} bytes", size);
        }
        None => {
            println!("No image is given. Use the default build-in image.");
        }
    }
    println!();

    Ok(Debugger::new(machine))
}

/// 終了状態が異常か
fn is_exit_status_bad(debugger: &Debugger) -> bool {
    match debugger.state() {
        ExecState::Ended { code, .. } => code != 0,
        ExecState::Quit => false,
        _ => true,
    }
}

/// セルフチェックを実行する
fn run_check(path: &Path) -> Result<bool> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Can not open '{}': {}", path.display(), e))?;
    let machine = Machine::default();
    let evaluator = ExpressionEvaluator::for_target(&machine);
    let report = run_cases(BufReader::new(file), &evaluator)?;

    for failure in &report.failures {
        println!("[[#{:5}]] {} : {}", failure.line, failure.expression, failure.reason);
    }
    println!("{} passed, {} failed", report.passed, report.failures.len());

    Ok(report.is_success())
}

/// REPLループを実行する
fn run_repl(debugger: &mut Debugger) -> Result<()> {
    println!("Type 'help' for available commands, 'q' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = home::home_dir().map(|dir| dir.join(".hinoki_history"));
    if let Some(path) = &history_path {
        // 履歴ファイルがなくても続行する
        let _ = rl.load_history(path);
    }

    let mut last_line = String::new();

    loop {
        let readline = rl.readline("(hinoki) ");
        match readline {
            Ok(line) => {
                let line = line.trim().to_string();
                // 空行は直前のコマンドを繰り返す
                let line = if line.is_empty() { last_line.clone() } else { line };
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line.as_str())?;
                last_line = line.clone();

                match handle_command(debugger, &mut rl, &line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                debugger.quit();
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        if let Err(e) = rl.save_history(path) {
            tracing::debug!("failed to save history: {}", e);
        }
    }

    Ok(())
}

/// コマンドを処理する。REPLを終了する場合は `false` を返す
fn handle_command(debugger: &mut Debugger, rl: &mut DefaultEditor, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line)? else {
        return Ok(true);
    };

    match command {
        Command::Help(name) => print_help(name.as_deref()),
        Command::Quit => return handle_quit(debugger, rl),
        Command::Continue => handle_execution(debugger, None),
        Command::StepInstruction(n) => handle_execution(debugger, Some(n)),
        Command::Info(InfoTarget::Registers) => print_registers(debugger),
        Command::Info(InfoTarget::Watchpoints) => print_watchpoints(debugger),
        Command::Examine { count, expression } => handle_examine(debugger, count, &expression)?,
        Command::Print(expression) => handle_print(debugger, expression.as_deref())?,
        Command::Watch(expression) => handle_watch(debugger, &expression)?,
        Command::Delete(expression) => handle_delete(debugger, rl, expression.as_deref())?,
    }

    Ok(true)
}

/// y/n で確認する
fn confirm(rl: &mut DefaultEditor, prompt: &str) -> Result<bool> {
    loop {
        let answer = rl.readline(prompt)?;
        match answer.trim().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

/// Quitコマンドを処理する
fn handle_quit(debugger: &mut Debugger, rl: &mut DefaultEditor) -> Result<bool> {
    if debugger.has_active_session() {
        println!("A running session is active.");
        if !confirm(rl, "Quit anyway? (y or n) ")? {
            return Ok(true);
        }
    }
    debugger.quit();
    println!("Exit hinoki.");
    Ok(false)
}

/// Continue/Stepコマンドを処理する（`None` はプログラム終了まで実行）
fn handle_execution(debugger: &mut Debugger, steps: Option<u64>) {
    let outcome = match steps {
        Some(n) => debugger.step(n),
        None => debugger.continue_execution(),
    };

    match outcome {
        Ok(StepOutcome::Completed) => {}
        Ok(StepOutcome::WatchpointTriggered) => {
            let pc = debugger.machine().registers().pc();
            println!("Watchpoint triggered at pc = 0x{:08x}", pc);
        }
        Ok(StepOutcome::Halted { pc, code }) => {
            if code == 0 {
                println!("hinoki: HIT GOOD TRAP at pc = 0x{:08x}", pc);
            } else {
                println!("hinoki: HIT BAD TRAP at pc = 0x{:08x} (code {})", pc, code);
            }
        }
        Err(e) => {
            println!("Error: {}", e);
        }
    }
}

/// Examineコマンドを処理する
fn handle_examine(debugger: &Debugger, count: u64, expression: &str) -> Result<()> {
    debugger.examine(count, expression, |address, data| {
        println!("0x{:08x}: 0x{:08x}", address, data);
    })
}

/// Printコマンドを処理する
fn handle_print(debugger: &mut Debugger, expression: Option<&str>) -> Result<()> {
    let result = debugger.print(expression)?;
    println!("${} = {}", result.index, result.value);
    Ok(())
}

/// Watchコマンドを処理する
fn handle_watch(debugger: &mut Debugger, expression: &str) -> Result<()> {
    let id = debugger.watch(expression)?;
    println!("Hardware watchpoint {}: {}", id, expression);
    Ok(())
}

/// Deleteコマンドを処理する
fn handle_delete(debugger: &mut Debugger, rl: &mut DefaultEditor, expression: Option<&str>) -> Result<()> {
    match expression {
        Some(expression) => {
            debugger.delete_watchpoint(expression)?;
        }
        None => {
            if confirm(rl, "Delete all watchpoints? (y or n) ")? {
                debugger.delete_all_watchpoints();
            }
        }
    }
    Ok(())
}

/// レジスタ一覧を表示する
fn print_registers(debugger: &Debugger) {
    for (name, value) in debugger.machine().registers().dump() {
        println!("{:<8}0x{:08x}    {}", name, value, value);
    }
}

/// ウォッチポイント一覧を表示する
fn print_watchpoints(debugger: &Debugger) {
    let watchpoints = debugger.watchpoints();
    if watchpoints.is_empty() {
        println!("No watchpoints.");
        return;
    }

    println!("Num     Type           Disp Enb Address            What");
    for wp in watchpoints {
        println!(
            "{:<3}     hw watchpoint  keep {}                      {}",
            wp.id,
            if wp.enabled { 'y' } else { 'n' },
            wp.expression
        );
    }
}

fn print_help(name: Option<&str>) {
    match name {
        Some(name) => match Command::describe(name) {
            Some(description) => println!("{} - {}", name, description),
            None => println!("Unknown command \"{}\".", name),
        },
        None => {
            println!("Available commands:");
            println!();
            for (command, description) in COMMANDS {
                println!("  {:<6} - {}", command, description);
            }
            println!();
            println!("Examples:");
            println!("  p $sp + 4 * 2");
            println!("  x 4 $pc");
            println!("  w *0x80000010 != 0");
        }
    }
}
