use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, builder::{Styles, styling::{AnsiColor, Effects}}, crate_description, crate_version};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatCli {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingCli {
    ShiftJis,
    Gbk,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultTypeCli {
    Any,
    Int,
    Decimal,
    String,
}

#[derive(Parser)]
#[command(name = "ysdec",
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Reconstructs a single expression from its bytecode
    Expr {
        /// Expression bytecode as hex (whitespace allowed)
        hex: String,

        /// Assignment target keyword; makes this an assignment expression
        #[arg(long)]
        keyword: Option<String>,

        /// Assignment load operator
        #[arg(long, default_value = "=")]
        load_op: String,

        /// Declared result type of the assignment
        #[arg(long, value_enum, default_value_t = ResultTypeCli::Any)]
        result_type: ResultTypeCli,

        /// Variable table (JSON array of variable declarations)
        #[arg(long)]
        variables: Option<PathBuf>,

        /// Output mode
        #[arg(long, value_enum, default_value_t = FormatCli::Text)]
        format: FormatCli,

        /// Script text encoding
        #[arg(long, value_enum, default_value_t = EncodingCli::ShiftJis)]
        encoding: EncodingCli,
    },
    /// Decompiles every script of a project dump
    Project {
        /// Path to the project dump (JSON)
        dump: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Output mode
        #[arg(long, value_enum, default_value_t = FormatCli::Text)]
        format: FormatCli,

        /// Script text encoding
        #[arg(long, value_enum, default_value_t = EncodingCli::ShiftJis)]
        encoding: EncodingCli,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}
