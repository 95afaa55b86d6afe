//! Typed read-only view of a `*.model3.json` descriptor.
//!
//! Only the parts the controller and catalog consume are typed; everything else
//! is left to the native runtime.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AvatarError, AvatarResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModelDescriptor {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub file_references: FileReferences,
    #[serde(default)]
    pub groups: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileReferences {
    #[serde(default)]
    pub moc: Option<String>,
    #[serde(default)]
    pub textures: Vec<String>,
    #[serde(default)]
    pub physics: Option<String>,
    #[serde(default)]
    pub pose: Option<String>,
    #[serde(default)]
    pub display_info: Option<String>,
    #[serde(default)]
    pub expressions: Vec<ExpressionRef>,
    /// Group name to motion entries, in declaration order.
    #[serde(default)]
    pub motions: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpressionRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MotionRef {
    #[serde(default)]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl ModelDescriptor {
    pub fn from_json_str(path: &Path, json: &str) -> AvatarResult<Self> {
        serde_json::from_str(json).map_err(|e| AvatarError::Descriptor {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> AvatarResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| AvatarError::io(path, e))?;
        Self::from_json_str(path, &text)
    }

    pub fn motion_groups(&self) -> Vec<String> {
        self.file_references.motions.keys().cloned().collect()
    }

    /// Entries of one motion group; malformed entries are skipped.
    pub fn motions(&self, group: &str) -> Vec<MotionRef> {
        self.file_references
            .motions
            .get(group)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value::<MotionRef>(v.clone()).ok())
                    .filter(|m| !m.file.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn expressions(&self) -> &[ExpressionRef] {
        &self.file_references.expressions
    }
}
