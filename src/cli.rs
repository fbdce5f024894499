use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "soyparse")]
#[command(about = "Soy template parser")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a template file and print it back as source or as a tree
    Parse(ParseArgs),
    /// Parse a standalone expression and print it back
    Expr(ExprArgs),
}

#[derive(clap::Args)]
pub struct ParseArgs {
    /// Input file path
    pub file: PathBuf,

    /// Globals file (NAME = value per line); may be repeated
    #[arg(long = "globals", value_name = "FILE")]
    pub globals: Vec<PathBuf>,

    /// Config file holding a [limits] table
    #[arg(long, value_name = "FILE", default_value = "soy.toml")]
    pub config: PathBuf,

    /// Print the indented node tree instead of source
    #[arg(long)]
    pub tree: bool,
}

#[derive(clap::Args)]
pub struct ExprArgs {
    /// Expression text, e.g. '$a + 1'
    pub text: String,

    /// Config file holding a [limits] table
    #[arg(long, value_name = "FILE", default_value = "soy.toml")]
    pub config: PathBuf,

    /// Print the indented node tree instead of source
    #[arg(long)]
    pub tree: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_arguments() {
        let cli = Cli::try_parse_from([
            "soyparse", "parse", "a.soy", "--globals", "g1.txt", "--globals", "g2.txt", "--tree",
        ])
        .unwrap();
        let Commands::Parse(args) = cli.command else {
            panic!("expected parse command");
        };
        assert_eq!(args.file, PathBuf::from("a.soy"));
        assert_eq!(args.globals.len(), 2);
        assert_eq!(args.config, PathBuf::from("soy.toml"));
        assert!(args.tree);
    }

    #[test]
    fn test_expr_command_arguments() {
        let cli = Cli::try_parse_from(["soyparse", "expr", "$a + 1"]).unwrap();
        let Commands::Expr(args) = cli.command else {
            panic!("expected expr command");
        };
        assert_eq!(args.text, "$a + 1");
        assert_eq!(args.config, PathBuf::from("soy.toml"));
        assert!(!args.tree);

        let cli = Cli::try_parse_from(["soyparse", "expr", "1", "--config", "limits.toml"]).unwrap();
        let Commands::Expr(args) = cli.command else {
            panic!("expected expr command");
        };
        assert_eq!(args.config, PathBuf::from("limits.toml"));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["soyparse"]).is_err());
    }
}
