//=====================================================
// File: main.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript CLI entry point
// Objective: Run, check, and dump OhScript modules from the command line
//=====================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ohscript::{Engine, EngineOptions, ScriptError, Value};

#[derive(Parser, Debug)]
#[command(name = "ohscript", about = "OhScript CLI")]
pub struct Args {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link the given modules and execute the entry module.
    Run(RunArgs),
    /// Parse, analyse, and link without executing.
    Check(CheckArgs),
    /// Print the syntax tree of one file.
    Ast(AstArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Script files; each becomes a module named by its file stem.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Module to execute (defaults to the last file).
    #[arg(long = "entry")]
    pub entry: Option<String>,

    /// Engine options in TOML.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Strings passed to the script as `args`.
    #[arg(last = true)]
    pub script_args: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AstArgs {
    pub file: PathBuf,
}

fn install_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("ohscript={}", level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn module_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cannot name a module after {}", path.display()))
}

fn engine(config: Option<&Path>) -> Result<Engine> {
    let options = match config {
        Some(path) => EngineOptions::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineOptions::default(),
    };
    Ok(Engine::with_options(options)?)
}

fn run(args: RunArgs) -> Result<()> {
    let engine = engine(args.config.as_deref())?;
    let mut builder = engine.begin();
    for file in &args.files {
        builder.load_file(&module_name(file)?, file)?;
    }
    let env = builder.new_env()?;
    let script_args: Vec<Value> = args.script_args.into_iter().map(Value::from).collect();
    let result = match &args.entry {
        Some(entry) => env.execute_module(entry, script_args),
        None => env.execute(script_args),
    };
    match result {
        Ok(Value::Unit) => Ok(()),
        Ok(value) => {
            println!("{}", value);
            Ok(())
        }
        Err(panic) => bail!("{} [{}]", ScriptError::from(panic.clone()).code_str(), panic),
    }
}

fn check(args: CheckArgs) -> Result<()> {
    let engine = engine(args.config.as_deref())?;
    let mut builder = engine.begin();
    for file in &args.files {
        builder.load_file(&module_name(file)?, file)?;
    }
    let forest = builder.done()?;
    for (module, warning) in forest.warnings() {
        println!("warning: {}:{}: {}", module, warning.position, warning.message);
    }
    println!("ok: {} module(s)", forest.modules().len());
    Ok(())
}

fn dump_ast(args: AstArgs) -> Result<()> {
    let source = fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let ast = ohscript::parse(&module_name(&args.file)?, &source)?;
    print!("{}", ast.program);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    install_tracing(args.verbose);
    let outcome = match args.command {
        Command::Run(run_args) => run(run_args),
        Command::Check(check_args) => check(check_args),
        Command::Ast(ast_args) => dump_ast(ast_args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

//=====================================================
// End of file
//=====================================================
