use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decode::OpcodeDecoder;
use crate::script::{DecompileError, DecompiledScript, ScriptDump, decompile_script};
use crate::variable::{Scope, VarInfo, VariableTable};
use crate::{DecompileOptions, OutputFormat};

/// Everything the container loaders extracted from a game's `ysbin` folder.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDump {
    #[serde(default)]
    pub variables: Vec<VarInfo>,
    #[serde(default)]
    pub scripts: Vec<ScriptDump>,
}

impl ProjectDump {
    pub fn from_json(s: &str) -> Result<Self, DecompileError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn variable_table(&self) -> VariableTable {
        self.variables.iter().cloned().collect()
    }
}

#[derive(Debug)]
pub struct ScriptOutcome {
    pub script_id: i32,
    pub source: String,
    pub result: Result<DecompiledScript, DecompileError>,
}

impl ScriptOutcome {
    /// Where this script's output goes below `root`.
    pub fn output_path(&self, root: &Path, format: OutputFormat) -> PathBuf {
        let path = root.join(&self.source);
        match format {
            OutputFormat::Text => path,
            OutputFormat::Json => path.with_extension("json"),
        }
    }

    /// Rendered file contents for `format`.
    pub fn render(&self, format: OutputFormat) -> Option<Result<String, serde_json::Error>> {
        let script = self.result.as_ref().ok()?;
        Some(match format {
            OutputFormat::Text => Ok(script.render_text()),
            OutputFormat::Json => script.to_json_pretty(),
        })
    }
}

/// Decompiles every script. A failed script is logged and reported in its
/// outcome; the remaining scripts are still processed.
pub fn decompile_project(dump: &ProjectDump, options: &DecompileOptions) -> Vec<ScriptOutcome> {
    let variables = dump.variable_table();
    let decoder = OpcodeDecoder::new(&variables, options.encoding);

    dump.scripts
        .iter()
        .map(|script| {
            let result = decompile_script(script, &decoder);
            if let Err(e) = &result {
                tracing::warn!(
                    script_id = script.script_id,
                    source = %script.source,
                    error = %e,
                    "script failed"
                );
            }
            ScriptOutcome {
                script_id: script.script_id,
                source: script.source.clone(),
                result,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariable {
    pub scope: String,
    pub script_index: i32,
    pub variable_id: u16,
    #[serde(rename = "type")]
    pub var_type: u8,
    pub name: String,
    pub dimensions: Vec<u32>,
    pub value: Option<serde_json::Value>,
}

/// Variable declarations in id order, as written to `global.json`.
pub fn globals_model(variables: &VariableTable) -> Vec<GlobalVariable> {
    variables
        .iter()
        .map(|v| GlobalVariable {
            scope: v.scope.to_string(),
            script_index: v.script_index,
            variable_id: v.variable_id,
            var_type: v.var_type,
            name: v.display_name(),
            dimensions: v.dimensions.clone(),
            value: v.value.clone(),
        })
        .collect()
}

/// `global.txt`: one declaration line per global-scope variable, in id order.
pub fn global_declarations(variables: &VariableTable) -> String {
    let mut out = String::new();
    for var in variables.iter().filter(|v| v.scope == Scope::Global) {
        match var.declaration() {
            Some(decl) => {
                out.push_str(&decl);
                out.push('\n');
            }
            None => tracing::debug!(variable_id = var.variable_id, "skipping untyped global"),
        }
    }
    out
}

/// File name and contents of the globals file for `format`.
pub fn render_globals(
    variables: &VariableTable,
    format: OutputFormat,
) -> Result<(&'static str, String), serde_json::Error> {
    Ok(match format {
        OutputFormat::Text => ("global.txt", global_declarations(variables)),
        OutputFormat::Json => (
            "global.json",
            serde_json::to_string_pretty(&globals_model(variables))?,
        ),
    })
}

/// Longest directory shared by all `paths`; the globals file goes there.
///
/// Components are compared case-insensitively.
pub fn common_dir<P: AsRef<Path>>(paths: &[P]) -> Option<PathBuf> {
    let mut iter = paths.iter();
    let first = iter.next()?.as_ref().parent()?;
    let mut common: Vec<_> = first.components().collect();
    for p in iter {
        let Some(dir) = p.as_ref().parent() else {
            return None;
        };
        let shared = common
            .iter()
            .zip(dir.components())
            .take_while(|(a, b)| {
                a.as_os_str()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&b.as_os_str().to_string_lossy())
            })
            .count();
        common.truncate(shared);
    }
    Some(common.iter().collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::decode::encode_token;

    const DUMP: &str = r#"{
        "variables": [
            { "scope": "Global", "scriptIndex": -1, "variableId": 3, "type": 1, "dimensions": [], "value": 10 },
            { "scope": "Global", "scriptIndex": -1, "variableId": 1, "type": 3, "dimensions": [4], "name": "names" },
            { "scope": "Local", "scriptIndex": 0, "variableId": 5, "type": 1, "dimensions": [] }
        ],
        "scripts": [
            { "scriptId": 0, "source": "scenario/a.yst", "commands": [
                { "name": "WAIT", "expressions": [ { "bytes": [72, 3, 0, 64, 3, 0] } ] },
                { "name": "END" }
            ] },
            { "scriptId": 1, "source": "scenario/b.yst", "commands": [
                { "name": "WAIT", "expressions": [ { "bytes": [43, 0, 0] } ] }
            ] },
            { "scriptId": 2, "source": "scenario/sub/c.yst", "commands": [
                { "name": "END" }
            ] }
        ]
    }"#;

    #[test]
    fn failed_scripts_do_not_stop_the_project() {
        let dump = ProjectDump::from_json(DUMP).unwrap();
        let outcomes = decompile_project(&dump, &DecompileOptions::default());
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0].render(OutputFormat::Text).unwrap().unwrap(),
            "WAIT[@g3]\n"
        );
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[1].render(OutputFormat::Text).is_none());
        assert_eq!(
            outcomes[2].render(OutputFormat::Text).unwrap().unwrap(),
            "//Empty file."
        );
    }

    #[test]
    fn output_paths_follow_format() {
        let dump = ProjectDump::from_json(DUMP).unwrap();
        let outcomes = decompile_project(&dump, &DecompileOptions::default());
        let root = Path::new("out");
        assert_eq!(
            outcomes[0].output_path(root, OutputFormat::Text),
            Path::new("out/scenario/a.yst")
        );
        assert_eq!(
            outcomes[0].output_path(root, OutputFormat::Json),
            Path::new("out/scenario/a.json")
        );
    }

    #[test]
    fn common_dir_is_case_insensitive() {
        let paths = ["out/Scenario/a.yst", "out/scenario/sub/c.yst", "out/SCENARIO/b.yst"];
        assert_eq!(common_dir(&paths), Some(PathBuf::from("out/Scenario")));
        assert_eq!(common_dir::<&str>(&[]), None);
    }

    #[test]
    fn globals_are_sorted_and_named() {
        let dump = ProjectDump::from_json(DUMP).unwrap();
        let globals = globals_model(&dump.variable_table());
        let names: Vec<&str> = globals.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["names", "g3", "l5"]);
        assert_eq!(globals[0].scope, Scope::Global.to_string());
        assert_eq!(globals[1].value, Some(serde_json::json!(10)));

        let json = serde_json::to_value(&globals).unwrap();
        assert_eq!(json[0]["value"], serde_json::Value::Null);
    }

    #[test]
    fn text_globals_declare_global_scope_only() {
        let dump = ProjectDump::from_json(DUMP).unwrap();
        let (name, text) = render_globals(&dump.variable_table(), OutputFormat::Text).unwrap();
        assert_eq!(name, "global.txt");
        assert_eq!(text, "G_STR[$names(4)]\nG_INT[@g3=10]\n");

        let (name, json) = render_globals(&dump.variable_table(), OutputFormat::Json).unwrap();
        assert_eq!(name, "global.json");
        assert!(json.contains("\"value\": 10"));
    }

    #[test]
    fn dump_bytes_match_wire_format() {
        assert_eq!(encode_token(b'H', &[b'@', 3, 0]), vec![72, 3, 0, 64, 3, 0]);
    }
}
