use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root(crate_dir: &Path) -> PathBuf {
    crate_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("crate directory should be <root>/crates/<name>")
        .to_path_buf()
}

fn take_until_paren_close<'a>(s: &'a str) -> Option<&'a str> {
    let s = s.trim();
    let j = s.rfind(')')?;
    Some(s[..j].trim())
}

fn parse_code(s: &str) -> u8 {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .expect("opcode byte must be written as 0xNN");
    u8::from_str_radix(hex, 16).expect("opcode byte")
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let root = workspace_root(&manifest_dir);

    let opcode_path = root.join("yuris").join("expr-opcode.def");
    println!("cargo:rerun-if-changed={}", opcode_path.display());

    let opcode_src = fs::read_to_string(&opcode_path).expect("read expr-opcode.def");

    let mut fmts: Vec<String> = Vec::new();
    let mut classes: Vec<String> = Vec::new();
    // (id, code, class, fmt)
    let mut ops: Vec<(String, u8, String, String)> = Vec::new();

    for line in opcode_src.lines() {
        let l = line.trim();
        if let Some(rest) = l.strip_prefix("FMT(") {
            let name = match take_until_paren_close(rest) {
                Some(v) => v,
                None => continue,
            };
            if !name.is_empty() {
                fmts.push(name.to_string());
            }
            continue;
        }

        let rest = match l.strip_prefix("DEF(") {
            Some(v) => v,
            None => continue,
        };
        let inner = match take_until_paren_close(rest) {
            Some(v) => v,
            None => continue,
        };
        let parts: Vec<&str> = inner.splitn(4, ',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            continue;
        }
        let id = parts[0].to_string();
        let code = parse_code(parts[1]);
        let class = parts[2].to_string();
        let fmt = parts[3].to_string();

        if !fmts.contains(&fmt) {
            panic!("opcode {id} uses undeclared format {fmt}");
        }
        if ops.iter().any(|(_, c, _, _)| *c == code) {
            panic!("opcode byte 0x{code:02x} defined twice");
        }
        if !classes.contains(&class) {
            classes.push(class.clone());
        }
        ops.push((id, code, class, fmt));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let out_path = out_dir.join("yuris_tables.rs");

    let mut out = String::new();

    out.push_str("#[allow(non_camel_case_types)]\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq)]\n");
    out.push_str("pub enum OpFmt {\n");
    for f in &fmts {
        out.push_str(&format!("    {},\n", f.to_ascii_uppercase()));
    }
    out.push_str("}\n\n");

    out.push_str("#[allow(non_camel_case_types)]\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq)]\n");
    out.push_str("pub enum OpClass {\n");
    for c in &classes {
        out.push_str(&format!("    {},\n", c));
    }
    out.push_str("}\n\n");

    out.push_str("#[derive(Debug, Clone, Copy)]\n");
    out.push_str("pub struct OpInfo {\n");
    out.push_str("    pub name: &'static str,\n");
    out.push_str("    pub code: u8,\n");
    out.push_str("    pub class: OpClass,\n");
    out.push_str("    pub fmt: OpFmt,\n");
    out.push_str("}\n\n");

    out.push_str("pub const OPCODE_INFO: &[OpInfo] = &[\n");
    for (id, code, class, fmt) in &ops {
        out.push_str(&format!(
            "    OpInfo {{ name: \"{}\", code: 0x{:02x}, class: OpClass::{}, fmt: OpFmt::{} }},\n",
            id,
            code,
            class,
            fmt.to_ascii_uppercase(),
        ));
    }
    out.push_str("];\n\n");

    // Byte -> OPCODE_INFO index + 1; 0 marks an unassigned byte.
    let mut index = [0usize; 256];
    for (i, (_, code, _, _)) in ops.iter().enumerate() {
        index[*code as usize] = i + 1;
    }
    out.push_str("pub const OPCODE_INDEX: [u8; 256] = [\n");
    for chunk in index.chunks(16) {
        let row: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
        out.push_str(&format!("    {},\n", row.join(", ")));
    }
    out.push_str("];\n");

    fs::write(out_path, out).expect("write generated yuris tables");
}
