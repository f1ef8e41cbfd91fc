/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/registry.rs
 * Responsibility: Static tool table, parameter schemas, and argument validation.
 */

use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    StringArray,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

/// Which implementation a registry entry routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListDirectory,
    ReadFile,
    RunScript,
    WriteFile,
}

/// One row of the registry: the wire-visible name the model calls, what the
/// model is told about it, and the parameters it may pass.
#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub kind: ToolKind,
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_files_info",
        description: "Lists files in the specified directory along with their sizes, constrained to the working directory.",
        params: &[ParamSpec {
            name: "directory",
            ty: ParamType::String,
            required: false,
            description: "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself.",
        }],
        kind: ToolKind::ListDirectory,
    },
    ToolSpec {
        name: "get_file_content",
        description: "Reads the content of a file, constrained to the working directory. Large files are truncated.",
        params: &[ParamSpec {
            name: "file_path",
            ty: ParamType::String,
            required: true,
            description: "Path of the file to read, relative to the working directory.",
        }],
        kind: ToolKind::ReadFile,
    },
    ToolSpec {
        name: "run_python_file",
        description: "Executes a Python file with optional command-line arguments, constrained to the working directory.",
        params: &[
            ParamSpec {
                name: "file_path",
                ty: ParamType::String,
                required: true,
                description: "Path of the Python file to execute, relative to the working directory.",
            },
            ParamSpec {
                name: "args",
                ty: ParamType::StringArray,
                required: false,
                description: "Optional command-line arguments passed to the script.",
            },
        ],
        kind: ToolKind::RunScript,
    },
    ToolSpec {
        name: "write_file",
        description: "Writes content to a file, creating it and any parent directories if needed. Existing content is replaced.",
        params: &[
            ParamSpec {
                name: "file_path",
                ty: ParamType::String,
                required: true,
                description: "Path of the file to write, relative to the working directory.",
            },
            ParamSpec {
                name: "content",
                ty: ParamType::String,
                required: true,
                description: "The full content to write to the file.",
            },
        ],
        kind: ToolKind::WriteFile,
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Gemini `functionDeclarations` for the whole registry.
pub static FUNCTION_DECLARATIONS: Lazy<Value> =
    Lazy::new(|| Value::Array(TOOLS.iter().map(ToolSpec::declaration).collect()));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("arguments must be an object")]
    NotAnObject,
    #[error("unknown parameter `{0}`")]
    Unknown(String),
    #[error("missing required parameter `{0}`")]
    Missing(&'static str),
    #[error("parameter `{name}` must be {expected}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
    },
}

/// A call whose arguments have passed the schema. Each variant owns fresh
/// values, so optional sequences never share state between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListDirectory { directory: Option<String> },
    ReadFile { file_path: String },
    RunScript { file_path: String, args: Vec<String> },
    WriteFile { file_path: String, content: String },
}

impl ToolSpec {
    fn declaration(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params {
            let schema = match param.ty {
                ParamType::String => json!({
                    "type": "string",
                    "description": param.description,
                }),
                ParamType::StringArray => json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": param.description,
                }),
            };
            properties.insert(param.name.to_string(), schema);
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();

        let mut parameters = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            parameters["required"] = json!(required);
        }

        json!({
            "name": self.name,
            "description": self.description,
            "parameters": parameters,
        })
    }

    /// Checks `args` against the declared parameters and builds a typed call.
    ///
    /// A missing or `null` argument bag is treated as empty; `null` values
    /// count as absent.
    pub fn validate(&self, args: &Value) -> Result<ToolCall, ArgumentError> {
        let empty = Map::new();
        let object = match args {
            Value::Null => &empty,
            Value::Object(object) => object,
            _ => return Err(ArgumentError::NotAnObject),
        };

        if let Some(unknown) = object
            .keys()
            .find(|key| !self.params.iter().any(|param| param.name == key.as_str()))
        {
            return Err(ArgumentError::Unknown(unknown.clone()));
        }

        let bag = ArgumentBag { object };
        for param in self.params {
            if param.required && bag.get(param.name).is_none() {
                return Err(ArgumentError::Missing(param.name));
            }
        }

        Ok(match self.kind {
            ToolKind::ListDirectory => ToolCall::ListDirectory {
                directory: bag.string("directory")?,
            },
            ToolKind::ReadFile => ToolCall::ReadFile {
                file_path: bag.required_string("file_path")?,
            },
            ToolKind::RunScript => ToolCall::RunScript {
                file_path: bag.required_string("file_path")?,
                args: bag.string_array("args")?.unwrap_or_default(),
            },
            ToolKind::WriteFile => ToolCall::WriteFile {
                file_path: bag.required_string("file_path")?,
                content: bag.required_string("content")?,
            },
        })
    }
}

struct ArgumentBag<'a> {
    object: &'a Map<String, Value>,
}

impl ArgumentBag<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.object.get(name).filter(|value| !value.is_null())
    }

    fn string(&self, name: &'static str) -> Result<Option<String>, ArgumentError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(ArgumentError::WrongType {
                name,
                expected: "a string",
            }),
        }
    }

    fn required_string(&self, name: &'static str) -> Result<String, ArgumentError> {
        self.string(name)?.ok_or(ArgumentError::Missing(name))
    }

    fn string_array(&self, name: &'static str) -> Result<Option<Vec<String>>, ArgumentError> {
        let wrong_type = || ArgumentError::WrongType {
            name,
            expected: "an array of strings",
        };
        match self.get(name) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(wrong_type))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(wrong_type()),
        }
    }
}
