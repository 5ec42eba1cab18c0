//! Snapshot script generation
//!
//! Renders a resolved [`ModuleGraph`] as one self-contained script: the loader
//! preamble, one wrapper per inlined module, and an epilogue carrying the
//! deferred-request table, the position table and the optional auxiliary
//! data literal. Output is a pure function of the graph and the auxiliary
//! data, so identical inputs give byte-identical scripts.

mod positions;
pub mod runtime;
mod writer;

pub use positions::{PositionSpan, PositionTable, Translation, EMBEDDED_FILENAME};
pub use writer::ScriptWriter;

use path_slash::PathExt as _;
use serde_json::{Map, Value};
use tracing::debug;

use crate::graph::{
    relative_key, EdgeTarget, ModuleGraph, ModuleKind, ModuleNode, MAIN_MODULE_KEY,
};

/// A rendered script together with the table that maps its lines back to
/// source files
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub script: String,
    pub positions: PositionTable,
}

#[derive(Debug, Default)]
pub struct SnapshotGenerator<'a> {
    auxiliary_data: Option<&'a Value>,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auxiliary_data(mut self, data: Option<&'a Value>) -> Self {
        self.auxiliary_data = data;
        self
    }

    pub fn generate(&self, graph: &ModuleGraph) -> GeneratedScript {
        let mut writer = ScriptWriter::new();
        let mut positions = PositionTable::new();

        writer.writeln("// Snapshot script generated by coldstart. Do not edit.");
        writer.writeln(runtime::PREAMBLE.trim_end_matches('\n'));

        for (idx, node) in graph.inlined() {
            let resolutions = resolution_map(graph, idx);
            self.write_module(&mut writer, &mut positions, node, resolutions);
        }

        writer.writeln(&format!(
            "  Object.assign(customRequire.hostRequests, {});",
            Value::Object(host_requests(graph))
        ));
        writer.writeln(&format!(
            "  const mainModuleKey = {};",
            js_string(MAIN_MODULE_KEY)
        ));
        writer.writeln(&format!("  const positionTable = {};", positions.to_json()));
        writer.writeln(runtime::EPILOGUE);

        if let Some(data) = self.auxiliary_data {
            writer.writeln(&format!(
                "var {} = {};",
                runtime::AUXILIARY_DATA_BINDING,
                data
            ));
        }

        debug!(
            "Generated snapshot with {} modules over {} lines",
            positions.len(),
            writer.current_line() - 1
        );

        GeneratedScript {
            script: writer.finish(),
            positions,
        }
    }

    fn write_module(
        &self,
        writer: &mut ScriptWriter,
        positions: &mut PositionTable,
        node: &ModuleNode,
        resolutions: Map<String, Value>,
    ) {
        writer.writeln(&format!(
            "  customRequire.definitions[{}] = {{",
            js_string(&node.relative_key)
        ));
        writer.writeln(&format!("    filename: {},", js_string(&node.display_path)));
        writer.writeln(&format!(
            "    dirname: {},",
            js_string(dirname(&node.display_path))
        ));
        writer.writeln(&format!("    resolutions: {},", Value::Object(resolutions)));

        let header = match node.kind {
            ModuleKind::Script => format!("    fn: function ({}) {{", runtime::MODULE_PARAMS),
            ModuleKind::Json => format!(
                "    fn: function ({}) {{ module.exports =",
                runtime::MODULE_PARAMS
            ),
        };
        writer.writeln(&header);

        let (start_line, end_line) = writer.write_block(&node.transformed_code);
        positions.push(PositionSpan {
            start_line,
            end_line,
            file: node.display_path.clone(),
            offset: 0,
        });

        writer.writeln("    },");
        writer.writeln("  };");
    }
}

/// Specifier to loader key, in require order
fn resolution_map(graph: &ModuleGraph, idx: usize) -> Map<String, Value> {
    let mut map = Map::new();
    for edge in graph.edges(idx) {
        let key = match edge.target {
            EdgeTarget::Module(target) => graph.node(target).relative_key.clone(),
            EdgeTarget::Deferred(ref path) => relative_key(graph.main_path(), path),
            EdgeTarget::Host => edge.specifier.clone(),
        };
        map.insert(edge.specifier.clone(), Value::String(key));
    }
    map
}

/// Loader keys answered by the host `require`, with the request to pass it.
/// Excluded and deferred files are requested by absolute path, host
/// specifiers as written.
fn host_requests(graph: &ModuleGraph) -> Map<String, Value> {
    let mut map = Map::new();
    for (idx, node) in graph.nodes().iter().enumerate() {
        if node.is_excluded && !map.contains_key(&node.relative_key) {
            let request = node.absolute_path.to_slash_lossy().into_owned();
            map.insert(node.relative_key.clone(), Value::String(request));
        }
        for edge in graph.edges(idx) {
            let (key, request) = match &edge.target {
                EdgeTarget::Module(_) => continue,
                EdgeTarget::Deferred(path) => (
                    relative_key(graph.main_path(), path),
                    path.to_slash_lossy().into_owned(),
                ),
                EdgeTarget::Host => (edge.specifier.clone(), edge.specifier.clone()),
            };
            map.entry(key).or_insert(Value::String(request));
        }
    }
    map
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn dirname(display_path: &str) -> &str {
    match display_path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::graph::GraphResolver;
    use crate::module_resolver::NodeResolver;
    use crate::transform::RequireScanTransform;
    use indoc::indoc;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        for (rel, content) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        (dir, root)
    }

    fn graph_of(root: &Path, exclude: &(dyn Fn(&Path) -> bool + Sync)) -> ModuleGraph {
        let cache = MemoryCache::new();
        let resolver = NodeResolver::new();
        GraphResolver::new(&cache, &RequireScanTransform, &resolver, exclude)
            .resolve(root, &root.join("index.js"))
            .unwrap()
    }

    #[test]
    fn test_module_bodies_land_on_their_spans() {
        let index = indoc! {"
            const lib = require('./lib/util')
            module.exports = lib.twice(21)
        "};
        let util = indoc! {"
            // helpers
            exports.twice = (n) => n * 2
        "};
        let (_dir, root) = project(&[("index.js", index), ("lib/util.js", util)]);

        let generated = SnapshotGenerator::new().generate(&graph_of(&root, &|_| false));
        let lines: Vec<&str> = generated.script.lines().collect();
        let spans = generated.positions.spans();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].file, "index.js");
        assert_eq!(spans[1].file, "lib/util.js");
        for (span, source) in spans.iter().zip([index, util]) {
            let body: Vec<&str> = lines[span.start_line - 1..span.end_line - 1].to_vec();
            assert_eq!(body, source.lines().collect::<Vec<_>>());
        }

        let second_line = spans[1].start_line + 1;
        assert_eq!(
            generated.positions.translate(second_line),
            Translation {
                filename: "lib/util.js".to_string(),
                line_number: 1
            }
        );
        assert_eq!(generated.positions.translate(1).filename, EMBEDDED_FILENAME);
    }

    #[test]
    fn test_spans_count_every_javascript_line_terminator() {
        let (_dir, root) = project(&[
            ("index.js", "require('./b')\r// x\u{2028}// y\n"),
            ("b.js", "exports.b = 1\n"),
        ]);

        let generated = SnapshotGenerator::new().generate(&graph_of(&root, &|_| false));
        let spans = generated.positions.spans();

        assert_eq!(spans[0].end_line - spans[0].start_line, 3);
        // Closing lines of the first wrapper plus the header of the second
        assert_eq!(spans[1].start_line - spans[0].end_line, 7);
        assert_eq!(generated.positions.translate(spans[1].start_line).filename, "b.js");
    }

    #[test]
    fn test_resolutions_and_host_requests() {
        let (_dir, root) = project(&[
            ("index.js", "require('./d'); require('./skip'); require('os')"),
            ("d.js", ""),
            ("skip.js", ""),
        ]);
        let exclude = |path: &Path| path.ends_with("skip.js");

        let script = SnapshotGenerator::new()
            .generate(&graph_of(&root, &exclude))
            .script;

        assert!(script.contains(r#"resolutions: {"./d":"../d.js","./skip":"../skip.js","os":"os"},"#));
        assert!(script.contains(r#"customRequire.definitions["../d.js"]"#));
        assert!(!script.contains(r#"customRequire.definitions["../skip.js"]"#));

        let skip_path = root.join("skip.js").to_slash_lossy().into_owned();
        let expected = format!(
            "Object.assign(customRequire.hostRequests, {});",
            json!({ "os": "os", "../skip.js": skip_path })
        );
        assert!(script.contains(&expected));
    }

    #[test]
    fn test_native_addons_are_requested_by_absolute_path() {
        let (_dir, root) = project(&[
            ("index.js", "require('./lib/x'); require('./other/y')"),
            ("lib/x.js", "require('./addon.node')"),
            ("lib/addon.node", ""),
            ("other/y.js", "require('./addon.node')"),
            ("other/addon.node", ""),
        ]);

        let script = SnapshotGenerator::new()
            .generate(&graph_of(&root, &|_| false))
            .script;

        assert!(script.contains(r#"resolutions: {"./addon.node":"../lib/addon.node"},"#));
        assert!(script.contains(r#"resolutions: {"./addon.node":"../other/addon.node"},"#));

        let lib_addon = root.join("lib/addon.node").to_slash_lossy().into_owned();
        let other_addon = root.join("other/addon.node").to_slash_lossy().into_owned();
        let expected = format!(
            "Object.assign(customRequire.hostRequests, {});",
            json!({
                "../lib/addon.node": lib_addon,
                "../other/addon.node": other_addon
            })
        );
        assert!(script.contains(&expected));
    }

    #[test]
    fn test_json_module_wrapper() {
        let (_dir, root) = project(&[
            ("index.js", "module.exports = require('./data.json')"),
            ("data.json", "{\n  \"answer\": 42\n}\n"),
        ]);

        let script = SnapshotGenerator::new()
            .generate(&graph_of(&root, &|_| false))
            .script;
        assert!(script.contains("{ module.exports =\n{\n  \"answer\": 42\n}\n    },"));
    }

    #[test]
    fn test_auxiliary_data_is_optional() {
        let (_dir, root) = project(&[("index.js", "")]);
        let graph = graph_of(&root, &|_| false);

        let without = SnapshotGenerator::new().generate(&graph).script;
        assert!(!without.contains(runtime::AUXILIARY_DATA_BINDING));

        let data = json!({ "b": [1, 2], "a": "x" });
        let with = SnapshotGenerator::new()
            .with_auxiliary_data(Some(&data))
            .generate(&graph)
            .script;
        assert!(with.ends_with("var snapshotAuxiliaryData = {\"b\":[1,2],\"a\":\"x\"};\n"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let (_dir, root) = project(&[
            ("index.js", "require('./a'); require('./b'); require('fs')"),
            ("a.js", "require('./b')"),
            ("b.js", "require('./a')"),
        ]);

        let first = SnapshotGenerator::new().generate(&graph_of(&root, &|_| false));
        let second = SnapshotGenerator::new().generate(&graph_of(&root, &|_| false));
        assert_eq!(first.script, second.script);
        assert_eq!(first.positions, second.positions);
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("index.js"), ".");
        assert_eq!(dirname("lib/util.js"), "lib");
        assert_eq!(dirname("a/b/c.js"), "a/b");
    }
}
