//! Node descriptors for the host UI.
//!
//! The host renders a node from its descriptor: the widgets come from
//! [`InputSpec`]s, the sockets from [`OutputSpec`]s. [`registry`] returns
//! both nodes, serializable to JSON.

use crate::saver::TargetFormat;
use serde::Serialize;
use serde_json::{Value, json};

pub const LOADER_CLASS: &str = "LoadImageWithInfo";
pub const SAVER_CLASS: &str = "SaveImageWithInfo";

/// Socket/widget types understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueKind {
    Image,
    Mask,
    String,
    Int,
    Boolean,
    /// One of [`InputSpec::choices`].
    Combo,
    /// Supplied by the host, never shown.
    Prompt,
    #[serde(rename = "EXTRA_PNGINFO")]
    ExtraPnginfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    pub multiline: bool,
    pub hidden: bool,
}

impl InputSpec {
    fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            min: None,
            max: None,
            choices: Vec::new(),
            multiline: false,
            hidden: false,
        }
    }

    fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSpec {
    pub name: &'static str,
    pub kind: ValueKind,
}

const fn output(name: &'static str, kind: ValueKind) -> OutputSpec {
    OutputSpec { name, kind }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDescriptor {
    pub class_name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    /// Output nodes run for their side effects.
    pub output_node: bool,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

/// Loader outputs, in socket order.
pub const LOADER_OUTPUTS: [OutputSpec; 11] = [
    output("image", ValueKind::Image),
    output("mask", ValueKind::Mask),
    output("filename", ValueKind::String),
    output("format", ValueKind::String),
    output("dpi", ValueKind::Int),
    output("width", ValueKind::Int),
    output("height", ValueKind::Int),
    output("long_edge", ValueKind::Int),
    output("short_edge", ValueKind::Int),
    output("file_size", ValueKind::Int),
    output("exif", ValueKind::String),
];

/// The loader's image picker offers `available_inputs`.
pub fn loader_descriptor(available_inputs: &[String]) -> NodeDescriptor {
    NodeDescriptor {
        class_name: LOADER_CLASS,
        display_name: "Load Image (with info)",
        category: "image",
        output_node: false,
        inputs: vec![InputSpec::new("image", ValueKind::Combo).choices(available_inputs.to_vec())],
        outputs: LOADER_OUTPUTS.to_vec(),
    }
}

pub fn saver_descriptor() -> NodeDescriptor {
    let formats = TargetFormat::ALL.iter().map(|f| f.to_string()).collect();
    NodeDescriptor {
        class_name: SAVER_CLASS,
        display_name: "Save Image (with info)",
        category: "image",
        output_node: true,
        inputs: vec![
            InputSpec::new("images", ValueKind::Image),
            InputSpec::new("filename", ValueKind::String).default(json!("image")),
            InputSpec::new("format", ValueKind::Combo)
                .choices(formats)
                .default(json!("original")),
            InputSpec::new("original_format", ValueKind::String).default(json!("png")),
            InputSpec::new("quality", ValueKind::Int)
                .default(json!(100))
                .range(0, 100),
            InputSpec::new("dpi", ValueKind::Int)
                .default(json!(96))
                .range(0, 10_000),
            InputSpec::new("exif", ValueKind::String)
                .default(json!("{}"))
                .multiline(),
            InputSpec::new("always_save_png", ValueKind::Boolean).default(json!(false)),
            InputSpec::new("image_preview", ValueKind::Boolean).default(json!(true)),
            InputSpec::new("prompt", ValueKind::Prompt).hidden(),
            InputSpec::new("extra_pnginfo", ValueKind::ExtraPnginfo).hidden(),
        ],
        outputs: vec![output("filename", ValueKind::String)],
    }
}

/// Both nodes, loader first.
pub fn registry(available_inputs: &[String]) -> Vec<NodeDescriptor> {
    vec![loader_descriptor(available_inputs), saver_descriptor()]
}
