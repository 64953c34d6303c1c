use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Static,
    Folder,
    Local,
}

impl Scope {
    fn prefix(self) -> char {
        match self {
            Scope::Global => 'g',
            Scope::Static => 's',
            Scope::Folder => 'f',
            Scope::Local => 'l',
        }
    }

    fn decl_prefix(self) -> &'static str {
        match self {
            Scope::Global => "G_",
            Scope::Static => "S_",
            Scope::Folder => "F_",
            Scope::Local => "",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Global => "Global",
            Scope::Static => "Static",
            Scope::Folder => "Folder",
            Scope::Local => "Local",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarInfo {
    pub scope: Scope,
    #[serde(default)]
    pub script_index: i32,
    pub variable_id: u16,
    #[serde(rename = "type", default)]
    pub var_type: u8,
    #[serde(default)]
    pub dimensions: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Initial value from the declaration, as stored in the dump.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl VarInfo {
    /// Name without the access mode character.
    ///
    /// Compiled scripts do not keep variable names, so unnamed variables get
    /// one synthesized from their scope and id.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => format!("{}{}", self.scope.prefix(), self.variable_id),
        }
    }

    pub fn is_array(&self) -> bool {
        !self.dimensions.is_empty()
    }

    /// Declaration line such as `G_INT[@score=5]` or `G_STR[$names(4)]`.
    ///
    /// `None` for variables with no declarable type.
    pub fn declaration(&self) -> Option<String> {
        let (ty, mode) = match self.var_type {
            1 => ("INT", '@'),
            2 => ("FLT", '@'),
            3 => ("STR", '$'),
            _ => return None,
        };
        let mut decl = format!("{}{ty}[{mode}{}", self.scope.decl_prefix(), self.display_name());
        if self.is_array() {
            let dims: Vec<String> = self.dimensions.iter().map(u32::to_string).collect();
            decl.push_str(&format!("({})", dims.join(",")));
        }
        match &self.value {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(s)) => decl.push_str(&format!("=\"{s}\"")),
            Some(v) => decl.push_str(&format!("={v}")),
        }
        decl.push(']');
        Some(decl)
    }
}

/// Read-only snapshot of the project's variable declarations, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    vars: HashMap<u16, VarInfo>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: VarInfo) -> Option<VarInfo> {
        self.vars.insert(var.variable_id, var)
    }

    pub fn get(&self, id: u16) -> Option<&VarInfo> {
        self.vars.get(&id)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &VarInfo> {
        let mut v: Vec<&VarInfo> = self.vars.values().collect();
        v.sort_by_key(|var| var.variable_id);
        v.into_iter()
    }
}

impl FromIterator<VarInfo> for VariableTable {
    fn from_iter<T: IntoIterator<Item = VarInfo>>(iter: T) -> Self {
        let mut table = Self::new();
        for var in iter {
            table.insert(var);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_names_use_scope_prefix() {
        let mut v = VarInfo {
            scope: Scope::Static,
            script_index: 3,
            variable_id: 42,
            var_type: 1,
            dimensions: vec![],
            name: None,
            value: None,
        };
        assert_eq!(v.display_name(), "s42");
        v.name = Some("score".into());
        assert_eq!(v.display_name(), "score");
    }

    #[test]
    fn declarations_carry_dimensions_and_value() {
        let mut v = VarInfo {
            scope: Scope::Global,
            script_index: -1,
            variable_id: 3,
            var_type: 1,
            dimensions: vec![],
            name: Some("score".into()),
            value: Some(serde_json::json!(5)),
        };
        assert_eq!(v.declaration().as_deref(), Some("G_INT[@score=5]"));

        v.var_type = 3;
        v.dimensions = vec![4, 2];
        v.value = None;
        assert_eq!(v.declaration().as_deref(), Some("G_STR[$score(4,2)]"));

        v.dimensions = vec![];
        v.value = Some(serde_json::json!("hi"));
        assert_eq!(v.declaration().as_deref(), Some("G_STR[$score=\"hi\"]"));

        v.var_type = 0;
        assert_eq!(v.declaration(), None);
    }

    #[test]
    fn table_iterates_in_id_order() {
        let table: VariableTable = [9u16, 2, 5]
            .into_iter()
            .map(|id| VarInfo {
                scope: Scope::Global,
                script_index: -1,
                variable_id: id,
                var_type: 1,
                dimensions: vec![],
                name: None,
                value: None,
            })
            .collect();
        let ids: Vec<u16> = table.iter().map(|v| v.variable_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn deserializes_camel_case() {
        let v: VarInfo = serde_json::from_str(
            r#"{"scope":"Local","scriptIndex":4,"variableId":11,"type":3,"dimensions":[8]}"#,
        )
        .unwrap();
        assert_eq!(v.scope, Scope::Local);
        assert_eq!(v.var_type, 3);
        assert!(v.is_array());
        assert_eq!(v.value, None);

        let json = r#"{"scope":"Global","variableId":1,"type":1,"value":7}"#;
        let v: VarInfo = serde_json::from_str(json).unwrap();
        assert_eq!(v.value, Some(serde_json::json!(7)));
    }
}
