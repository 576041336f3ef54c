//! Model compilation into a self-contained graph script.

use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::graph::{Model, ModelGraph};

/// Format marker written into every generated script.
pub const GRAPH_SCRIPT_FORMAT: &str = "trialforge-graph/1";

/// Turns a model into the source text a runner materializes and loads.
pub trait ModelCompiler: Send + Sync {
    /// Produce the generated model source for `model`.
    fn compile(&self, model: &Model) -> Result<String, BoxError>;
}

#[derive(Serialize)]
struct ScriptOut<'a> {
    format: &'a str,
    graph: &'a ModelGraph,
}

#[derive(Deserialize)]
struct ScriptIn {
    format: String,
    graph: ModelGraph,
}

/// Emits the model graph as a tagged JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphScriptCompiler;

impl ModelCompiler for GraphScriptCompiler {
    fn compile(&self, model: &Model) -> Result<String, BoxError> {
        let script = serde_json::to_string_pretty(&ScriptOut {
            format: GRAPH_SCRIPT_FORMAT,
            graph: model.graph(),
        })?;
        Ok(script)
    }
}

/// Parse a script produced by [`GraphScriptCompiler`].
pub fn parse_graph_script(script: &str) -> Result<ModelGraph, String> {
    let parsed: ScriptIn = serde_json::from_str(script).map_err(|e| e.to_string())?;
    if parsed.format != GRAPH_SCRIPT_FORMAT {
        return Err(format!(
            "unsupported script format {:?} (expected {GRAPH_SCRIPT_FORMAT:?})",
            parsed.format
        ));
    }
    Ok(parsed.graph)
}
