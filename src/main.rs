use std::fs;
use std::path::Path;

use clap::Parser;

use soy_parse::ast::{dump, dump_expr};
use soy_parse::cli::{Cli, Commands, ExprArgs, ParseArgs};
use soy_parse::globals::{load_globals_file, merge_globals};
use soy_parse::limits::ParserLimits;
use soy_parse::parser::{parse_expr_with_limits, parse_file_with_limits};
use soy_parse::value::Globals;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Parse(args) => run_parse(args),
        Commands::Expr(args) => run_expr(args),
    }
}

fn load_limits(config: &Path) -> Result<ParserLimits, Box<dyn std::error::Error>> {
    let limits = ParserLimits::from_config_toml(config)?;
    limits.validate()?;
    Ok(limits)
}

fn run_parse(args: ParseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let limits = load_limits(&args.config)?;

    let mut globals = Globals::new();
    for path in &args.globals {
        merge_globals(&mut globals, load_globals_file(path)?)?;
    }

    let text = fs::read_to_string(&args.file)
        .map_err(|e| format!("failed to read {}: {}", args.file.display(), e))?;
    let name = args.file.display().to_string();
    let file = parse_file_with_limits(&name, &text, &globals, &limits)?;

    if args.tree {
        print!("{}", dump(&file.body));
    } else {
        println!("{}", file);
    }
    Ok(())
}

fn run_expr(args: ExprArgs) -> Result<(), Box<dyn std::error::Error>> {
    let limits = load_limits(&args.config)?;
    let expr = parse_expr_with_limits(&args.text, &limits)?;
    if args.tree {
        print!("{}", dump_expr(&expr));
    } else {
        println!("{}", expr);
    }
    Ok(())
}
