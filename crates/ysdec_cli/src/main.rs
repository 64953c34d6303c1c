use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, bail};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use ysdec_lib::{
    DecompileOptions, ExpressionInfo, OutputFormat, ProjectDump, ResultType, ScriptOutcome,
    TextEncoding, VarInfo, VariableTable, project,
};

use crate::cli::{Cli, EncodingCli, FormatCli, ResultTypeCli, TopLevel};

mod cli;

fn options(format: FormatCli, encoding: EncodingCli) -> DecompileOptions {
    DecompileOptions {
        format: match format {
            FormatCli::Text => OutputFormat::Text,
            FormatCli::Json => OutputFormat::Json,
        },
        encoding: match encoding {
            EncodingCli::ShiftJis => TextEncoding::ShiftJis,
            EncodingCli::Gbk => TextEncoding::Gbk,
            EncodingCli::Utf8 => TextEncoding::Utf8,
        },
    }
}

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).with_context(|| format!("invalid hex byte {byte:?}"))
        })
        .collect()
}

fn load_variables(path: Option<&Path>) -> anyhow::Result<VariableTable> {
    let Some(path) = path else {
        return Ok(VariableTable::new());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let vars: Vec<VarInfo> =
        serde_json::from_str(&text).with_context(|| format!("invalid variable table {path:?}"))?;
    Ok(vars.into_iter().collect())
}

fn run_expr(
    hex: &str,
    keyword: Option<String>,
    load_op: &str,
    result_type: ResultTypeCli,
    variables: Option<&Path>,
    options: DecompileOptions,
) -> anyhow::Result<ExitCode> {
    let bytes = parse_hex(hex)?;
    let variables = load_variables(variables)?;
    let assignment = keyword.map(|keyword| {
        let result_type = match result_type {
            ResultTypeCli::Any => ResultType::Any,
            ResultTypeCli::Int => ResultType::Int,
            ResultTypeCli::Decimal => ResultType::Decimal,
            ResultTypeCli::String => ResultType::String,
        };
        (
            ExpressionInfo {
                keyword: Some(keyword),
                result_type,
            },
            load_op,
        )
    });

    match ysdec_lib::decompile_expression(&bytes, assignment, &variables, &options) {
        Ok(set) => {
            match options.format {
                OutputFormat::Text => println!("{set}"),
                OutputFormat::Json => {
                    let ast = set.root().map(ysdec_lib::ast_to_json);
                    println!("{}", serde_json::to_string_pretty(&ast)?);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("decompile error: {e}");
            eprintln!("{}", e.diagnostic());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// What a project run put on disk.
#[derive(Debug)]
struct ProjectSummary {
    written: Vec<PathBuf>,
    globals: PathBuf,
    failed: usize,
}

fn write_project(
    dump: &ProjectDump,
    outcomes: &[ScriptOutcome],
    out: &Path,
    format: OutputFormat,
) -> anyhow::Result<ProjectSummary> {
    let mut written = Vec::new();
    let mut failed = 0usize;

    for outcome in outcomes {
        let path = outcome.output_path(out, format);
        print!("Decompiling yst{:05}.ybn ...", outcome.script_id);
        match outcome.render(format) {
            Some(rendered) => {
                let rendered = rendered.context("failed to serialize script")?;
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
                }
                fs::write(&path, rendered).with_context(|| format!("failed to write {path:?}"))?;
                println!(" -> {}", path.display());
                written.push(path);
            }
            None => {
                failed += 1;
                println!(" -> Failed.");
                if let Err(e) = &outcome.result {
                    eprintln!("{e}");
                    if let Some(report) = e.diagnostic() {
                        eprintln!("{report}");
                    }
                }
            }
        }
    }

    let all_paths: Vec<PathBuf> = outcomes.iter().map(|o| o.output_path(out, format)).collect();
    let globals_dir = project::common_dir(&all_paths).unwrap_or_else(|| out.to_path_buf());
    let (name, contents) = project::render_globals(&dump.variable_table(), format)?;
    let globals = globals_dir.join(name);
    fs::create_dir_all(&globals_dir).with_context(|| format!("failed to create {globals_dir:?}"))?;
    fs::write(&globals, contents).with_context(|| format!("failed to write {globals:?}"))?;

    Ok(ProjectSummary {
        written,
        globals,
        failed,
    })
}

fn run_project(dump: &Path, out: &Path, options: DecompileOptions) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(dump).with_context(|| format!("failed to read {dump:?}"))?;
    let project =
        ProjectDump::from_json(&text).with_context(|| format!("failed to parse {dump:?}"))?;

    let outcomes = ysdec_lib::decompile_project(&project, &options);
    let summary = write_project(&project, &outcomes, out, options.format)?;

    tracing::info!(
        written = summary.written.len(),
        failed = summary.failed,
        globals = %summary.globals.display(),
        "project decompiled"
    );

    if summary.failed > 0 {
        eprintln!("{} of {} scripts failed", summary.failed, outcomes.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(TopLevel::Expr {
            hex,
            keyword,
            load_op,
            result_type,
            variables,
            format,
            encoding,
        }) => run_expr(
            &hex,
            keyword,
            &load_op,
            result_type,
            variables.as_deref(),
            options(format, encoding),
        ),
        Some(TopLevel::Project {
            dump,
            out,
            format,
            encoding,
        }) => run_project(&dump, &out, options(format, encoding)),
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn hex_parsing_ignores_whitespace() {
        assert_eq!(parse_hex("49 04 00\n01000000").unwrap(), vec![0x49, 4, 0, 1, 0, 0, 0]);
        assert!(parse_hex("4").is_err());
        assert!(parse_hex("zz").is_err());
    }

    const DUMP: &str = r#"{
        "variables": [
            { "scope": "Global", "scriptIndex": -1, "variableId": 1, "type": 1, "name": "score", "value": 3 }
        ],
        "scripts": [
            { "scriptId": 0, "source": "sc/a.yst", "commands": [
                { "name": "WAIT", "expressions": [ { "bytes": [72, 3, 0, 64, 1, 0] } ] }
            ] },
            { "scriptId": 1, "source": "sc/b.yst", "commands": [
                { "name": "WAIT", "expressions": [ { "bytes": [43, 0, 0] } ] }
            ] }
        ]
    }"#;

    fn write_dump(format: OutputFormat) -> (tempfile::TempDir, ProjectSummary) {
        let dir = tempdir().unwrap();
        let project = ProjectDump::from_json(DUMP).unwrap();
        let options = DecompileOptions {
            format,
            ..DecompileOptions::default()
        };
        let outcomes = ysdec_lib::decompile_project(&project, &options);
        let summary = write_project(&project, &outcomes, dir.path(), format).unwrap();
        (dir, summary)
    }

    #[test]
    fn project_writes_scripts_and_text_globals() {
        let (dir, summary) = write_dump(OutputFormat::Text);
        let script = dir.path().join("sc/a.yst");
        assert_eq!(summary.written, vec![script.clone()]);
        assert_eq!(fs::read_to_string(&script).unwrap(), "WAIT[@score]\n");
        assert!(!dir.path().join("sc/b.yst").exists());
        assert_eq!(summary.failed, 1);

        assert_eq!(summary.globals, dir.path().join("sc/global.txt"));
        assert_eq!(fs::read_to_string(&summary.globals).unwrap(), "G_INT[@score=3]\n");
    }

    #[test]
    fn project_json_mode_writes_json_globals() {
        let (dir, summary) = write_dump(OutputFormat::Json);
        assert_eq!(summary.written, vec![dir.path().join("sc/a.json")]);
        assert_eq!(summary.globals, dir.path().join("sc/global.json"));
        let globals: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary.globals).unwrap()).unwrap();
        assert_eq!(globals[0]["name"], "score");
        assert_eq!(globals[0]["value"], 3);
    }

    #[test]
    fn failed_script_makes_the_run_fail() {
        let dir = tempdir().unwrap();
        let dump = dir.path().join("dump.json");
        fs::write(&dump, DUMP).unwrap();
        let out = dir.path().join("out");
        let code = run_project(&dump, &out, DecompileOptions::default()).unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(out.join("sc/a.yst").exists());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
