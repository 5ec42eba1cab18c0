//! Static module graph resolution
//!
//! Discovery is a depth-first walk in require order guarded by a visited set,
//! so the graph itself never holds a cycle: a module reached a second time is
//! just an edge to an existing index. Reading, hashing and transforming the
//! direct dependencies of a module is fanned out with rayon before the walk
//! descends into them, but nodes are only appended in walk order.

use path_slash::PathExt as _;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

use crate::cache::{hash_source, TransformCache, TransformRecord};
use crate::errors::{Result, SnapshotError};
use crate::module_resolver::{Resolution, SpecifierResolver};
use crate::transform::Transform;

/// Index of a module inside its [`ModuleGraph`]
pub type ModuleIdx = usize;

/// Loader key of the entry module itself
pub const MAIN_MODULE_KEY: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Json,
}

impl ModuleKind {
    fn of(path: &Path) -> Self {
        if path.extension().is_some_and(|ext| ext == "json") {
            ModuleKind::Json
        } else {
            ModuleKind::Script
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub absolute_path: PathBuf,

    /// Path relative to the entry module, forward slashes; the embedded
    /// loader's cache key
    pub relative_key: String,

    /// Path relative to the base directory, forward slashes; used in line
    /// translation results
    pub display_path: String,

    pub kind: ModuleKind,
    pub is_excluded: bool,
    pub transformed_code: String,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    Module(ModuleIdx),
    /// A file only the host loader can load; requested by absolute path
    Deferred(PathBuf),
    /// Resolved by the host loader using the specifier as written
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub specifier: String,
    pub target: EdgeTarget,
}

/// Modules in first-discovered order; index 0 is the entry module
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    base_dir: PathBuf,
    main_path: PathBuf,
    nodes: Vec<ModuleNode>,
    edges: Vec<Vec<Edge>>,
    index: FxHashMap<PathBuf, ModuleIdx>,
}

impl ModuleGraph {
    fn new(base_dir: PathBuf, main_path: PathBuf) -> Self {
        Self {
            base_dir,
            main_path,
            nodes: Vec::new(),
            edges: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    pub fn nodes(&self) -> &[ModuleNode] {
        &self.nodes
    }

    pub fn node(&self, idx: ModuleIdx) -> &ModuleNode {
        &self.nodes[idx]
    }

    /// Outgoing edges of a module, in require order. Always empty for
    /// excluded modules.
    pub fn edges(&self, idx: ModuleIdx) -> &[Edge] {
        &self.edges[idx]
    }

    pub fn get(&self, absolute_path: &Path) -> Option<ModuleIdx> {
        self.index.get(absolute_path).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Modules whose bodies end up in the script
    pub fn inlined(&self) -> impl Iterator<Item = (ModuleIdx, &ModuleNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_excluded)
    }

    fn insert(&mut self, node: ModuleNode) -> ModuleIdx {
        let idx = self.nodes.len();
        self.index.insert(node.absolute_path.clone(), idx);
        self.nodes.push(node);
        self.edges.push(Vec::new());
        idx
    }
}

/// Code and requires of a module that is going to be inlined
#[derive(Debug)]
struct LoadedSource {
    kind: ModuleKind,
    code: String,
    requires: Vec<String>,
}

/// Walks the require graph from an entry file
pub struct GraphResolver<'a> {
    cache: &'a dyn TransformCache,
    transform: &'a dyn Transform,
    resolver: &'a dyn SpecifierResolver,
    should_exclude: &'a (dyn Fn(&Path) -> bool + Sync),
}

impl<'a> GraphResolver<'a> {
    pub fn new(
        cache: &'a dyn TransformCache,
        transform: &'a dyn Transform,
        resolver: &'a dyn SpecifierResolver,
        should_exclude: &'a (dyn Fn(&Path) -> bool + Sync),
    ) -> Self {
        Self {
            cache,
            transform,
            resolver,
            should_exclude,
        }
    }

    pub fn resolve(&self, base_dir: &Path, main_path: &Path) -> Result<ModuleGraph> {
        let base_dir = normalize(base_dir);
        let main_path = normalize(main_path);
        let mut walk = Walk {
            graph: ModuleGraph::new(base_dir, main_path.clone()),
            prepared: FxHashMap::default(),
            pending: Vec::new(),
        };

        let root = self.visit(&mut walk, main_path)?;
        let mut stack = vec![(root, 0usize)];

        while let Some(frame) = stack.last_mut() {
            let (idx, cursor) = *frame;
            let Some((specifier, resolution)) = walk.pending[idx].get(cursor).cloned() else {
                stack.pop();
                continue;
            };
            frame.1 += 1;

            let target = match resolution {
                Resolution::Host => {
                    debug!("Deferring {:?} to the host loader", specifier);
                    EdgeTarget::Host
                }
                Resolution::Deferred(path) => EdgeTarget::Deferred(path),
                Resolution::File(path) => match walk.graph.get(&path) {
                    Some(existing) => EdgeTarget::Module(existing),
                    None => {
                        let child = self.visit(&mut walk, path)?;
                        stack.push((child, 0));
                        EdgeTarget::Module(child)
                    }
                },
            };
            walk.graph.edges[idx].push(Edge { specifier, target });
        }

        let excluded = walk.graph.nodes.iter().filter(|n| n.is_excluded).count();
        info!(
            "Resolved {} modules ({} excluded)",
            walk.graph.len(),
            excluded
        );
        Ok(walk.graph)
    }

    /// Append a node for `path` and resolve its specifiers
    fn visit(&self, walk: &mut Walk, path: PathBuf) -> Result<ModuleIdx> {
        let relative_key = relative_key(&walk.graph.main_path, &path);
        let display_path = slash_relative(&path, &walk.graph.base_dir);

        if (self.should_exclude)(&path) {
            debug!("Excluding {}", display_path);
            let idx = walk.graph.insert(ModuleNode {
                kind: ModuleKind::of(&path),
                absolute_path: path,
                relative_key,
                display_path,
                is_excluded: true,
                transformed_code: String::new(),
                requires: Vec::new(),
            });
            walk.pending.push(Vec::new());
            return Ok(idx);
        }

        let loaded = match walk.prepared.remove(&path) {
            Some(prepared) => prepared?,
            None => self.load(&path)?,
        };

        let targets = loaded
            .requires
            .iter()
            .map(|specifier| {
                self.resolver
                    .resolve(specifier, &path)
                    .map(|resolution| (specifier.clone(), resolution))
            })
            .collect::<Result<Vec<_>>>()?;
        self.prefetch(walk, &targets);

        trace!("Including {} as {}", display_path, relative_key);
        let idx = walk.graph.insert(ModuleNode {
            absolute_path: path,
            relative_key,
            display_path,
            kind: loaded.kind,
            is_excluded: false,
            transformed_code: loaded.code,
            requires: loaded.requires,
        });
        walk.pending.push(targets);
        Ok(idx)
    }

    /// Load every not-yet-seen inlinable dependency in parallel. Results
    /// (including failures) are parked until the walk reaches them, so errors
    /// surface in walk order.
    fn prefetch(&self, walk: &mut Walk, targets: &[(String, Resolution)]) {
        let mut fresh: Vec<&PathBuf> = Vec::new();
        for (_, resolution) in targets {
            if let Resolution::File(path) = resolution {
                if walk.graph.get(path).is_none()
                    && !walk.prepared.contains_key(path)
                    && !fresh.contains(&path)
                    && !(self.should_exclude)(path)
                {
                    fresh.push(path);
                }
            }
        }
        if fresh.is_empty() {
            return;
        }

        let loaded: Vec<(PathBuf, Result<LoadedSource>)> = fresh
            .into_par_iter()
            .map(|path| (path.clone(), self.load(path)))
            .collect();
        walk.prepared.extend(loaded);
    }

    fn load(&self, path: &Path) -> Result<LoadedSource> {
        let bytes = std::fs::read(path).map_err(|e| SnapshotError::io(path, e))?;
        let content_hash = hash_source(&bytes);
        let source = String::from_utf8(bytes).map_err(|_| SnapshotError::Transform {
            file: path.to_path_buf(),
            message: "source is not valid UTF-8".to_string(),
        })?;

        if ModuleKind::of(path) == ModuleKind::Json {
            serde_json::from_str::<serde::de::IgnoredAny>(&source).map_err(|e| {
                SnapshotError::Transform {
                    file: path.to_path_buf(),
                    message: e.to_string(),
                }
            })?;
            return Ok(LoadedSource {
                kind: ModuleKind::Json,
                code: source,
                requires: Vec::new(),
            });
        }

        if let Some(entry) = self.cache.get(path, &content_hash)? {
            trace!("Cache hit for {:?}", path);
            return Ok(LoadedSource {
                kind: ModuleKind::Script,
                code: entry.transformed_code,
                requires: entry.requires,
            });
        }

        debug!("Cache miss for {:?}, transforming", path);
        let output =
            self.transform
                .transform(&source, path)
                .map_err(|e| SnapshotError::Transform {
                    file: path.to_path_buf(),
                    message: e.message,
                })?;
        let entry = self.cache.put(TransformRecord {
            file_path: path.to_path_buf(),
            original: source,
            transformed: output.code,
            requires: output.requires,
        })?;

        Ok(LoadedSource {
            kind: ModuleKind::Script,
            code: entry.transformed_code,
            requires: entry.requires,
        })
    }
}

struct Walk {
    graph: ModuleGraph,
    prepared: FxHashMap<PathBuf, Result<LoadedSource>>,
    /// Resolved specifiers per node, consumed by the walk
    pending: Vec<Vec<(String, Resolution)>>,
}

/// Loader key of `path`: its location relative to the entry file, so a
/// sibling `d.js` of entry `a.js` is `../d.js`
pub fn relative_key(main_path: &Path, path: &Path) -> String {
    if path == main_path {
        return MAIN_MODULE_KEY.to_string();
    }
    slash_relative(path, main_path)
}

fn slash_relative(path: &Path, base: &Path) -> String {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
    relative.as_path().to_slash_lossy().into_owned()
}

/// Canonical form when the path exists, so keys agree with what the
/// resolver returns for symlinked directories
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::module_resolver::NodeResolver;
    use crate::transform::RequireScanTransform;
    use tempfile::TempDir;

    struct Project {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Project {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().canonicalize().unwrap();
            for (rel, content) in files {
                let path = root.join(rel);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            Self { _dir: dir, root }
        }

        fn resolve_with(
            &self,
            cache: &MemoryCache,
            exclude: &(dyn Fn(&Path) -> bool + Sync),
        ) -> Result<ModuleGraph> {
            let resolver = NodeResolver::new();
            GraphResolver::new(cache, &RequireScanTransform, &resolver, exclude)
                .resolve(&self.root, &self.root.join("index.js"))
        }

        fn resolve(&self) -> Result<ModuleGraph> {
            self.resolve_with(&MemoryCache::new(), &|_| false)
        }
    }

    fn keys(graph: &ModuleGraph) -> Vec<&str> {
        graph
            .nodes()
            .iter()
            .map(|n| n.display_path.as_str())
            .collect()
    }

    #[test]
    fn test_depth_first_require_order() {
        let project = Project::new(&[
            ("index.js", "require('./b'); require('./c')"),
            ("b.js", "require('./d')"),
            ("c.js", ""),
            ("d.js", ""),
        ]);

        let graph = project.resolve().unwrap();
        assert_eq!(keys(&graph), vec!["index.js", "b.js", "d.js", "c.js"]);
    }

    #[test]
    fn test_relative_keys_are_relative_to_entry_file() {
        let project = Project::new(&[
            ("index.js", "require('./lib/d')"),
            ("lib/d.js", ""),
        ]);

        let graph = project.resolve().unwrap();
        assert_eq!(graph.node(0).relative_key, MAIN_MODULE_KEY);
        assert_eq!(graph.node(1).relative_key, "../lib/d.js");
        assert_eq!(graph.node(1).display_path, "lib/d.js");
    }

    #[test]
    fn test_cycles_become_back_edges() {
        let project = Project::new(&[
            ("index.js", "require('./a')"),
            ("a.js", "require('./b')"),
            ("b.js", "require('./a'); require('./index')"),
        ]);

        let graph = project.resolve().unwrap();
        assert_eq!(graph.len(), 3);
        let b = graph.get(&project.root.join("b.js")).unwrap();
        assert_eq!(
            graph.edges(b),
            &[
                Edge {
                    specifier: "./a".to_string(),
                    target: EdgeTarget::Module(1)
                },
                Edge {
                    specifier: "./index".to_string(),
                    target: EdgeTarget::Module(0)
                },
            ]
        );
    }

    #[test]
    fn test_excluded_module_is_not_read_or_traversed() {
        let project = Project::new(&[
            ("index.js", "require('./skip')"),
            // Would fail to parse if it were read
            ("skip.js", "require('./hidden'); const = ;"),
            ("hidden.js", ""),
        ]);

        let exclude = |path: &Path| path.ends_with("skip.js");
        let graph = project.resolve_with(&MemoryCache::new(), &exclude).unwrap();

        assert_eq!(keys(&graph), vec!["index.js", "skip.js"]);
        let skip = graph.node(1);
        assert!(skip.is_excluded);
        assert!(skip.requires.is_empty());
        assert!(graph.edges(1).is_empty());
        assert_eq!(graph.inlined().count(), 1);
    }

    #[test]
    fn test_builtins_become_host_edges() {
        let project = Project::new(&[("index.js", "require('fs'); require('missing-pkg')")]);

        let graph = project.resolve().unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph
            .edges(0)
            .iter()
            .all(|edge| edge.target == EdgeTarget::Host));
    }

    #[test]
    fn test_native_addons_become_deferred_edges() {
        let project = Project::new(&[
            ("index.js", "require('./lib/addon.node')"),
            ("lib/addon.node", ""),
        ]);

        let graph = project.resolve().unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.edges(0),
            &[Edge {
                specifier: "./lib/addon.node".to_string(),
                target: EdgeTarget::Deferred(project.root.join("lib/addon.node")),
            }]
        );
    }

    #[test]
    fn test_json_modules() {
        let project = Project::new(&[
            ("index.js", "require('./data.json')"),
            ("data.json", "{\"a\": [1, 2]}"),
        ]);

        let cache = MemoryCache::new();
        let graph = project.resolve_with(&cache, &|_| false).unwrap();
        assert_eq!(graph.node(1).kind, ModuleKind::Json);
        assert_eq!(graph.node(1).transformed_code, "{\"a\": [1, 2]}");
        // Only the script went through the transform cache
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_a_transform_error() {
        let project = Project::new(&[
            ("index.js", "require('./data.json')"),
            ("data.json", "{oops"),
        ]);

        let err = project.resolve().unwrap_err();
        assert!(matches!(err, SnapshotError::Transform { .. }));
    }

    #[test]
    fn test_cached_requires_are_trusted() {
        let project = Project::new(&[("index.js", "require('./a')"), ("a.js", "")]);
        let main = project.root.join("index.js");
        let cache = MemoryCache::new();
        cache
            .put(TransformRecord {
                file_path: main.clone(),
                original: std::fs::read_to_string(&main).unwrap(),
                transformed: "global.seeded = true".to_string(),
                requires: vec![],
            })
            .unwrap();

        let graph = project.resolve_with(&cache, &|_| false).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node(0).transformed_code, "global.seeded = true");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_relative_require_aborts() {
        let project = Project::new(&[("index.js", "require('./nope')")]);

        let err = project.resolve().unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::ModuleResolution { ref specifier, .. } if specifier == "./nope"
        ));
    }

    #[test]
    fn test_transform_error_aborts() {
        let project = Project::new(&[("index.js", "require('./bad')"), ("bad.js", "let = ;")]);

        let err = project.resolve().unwrap_err();
        match err {
            SnapshotError::Transform { file, .. } => assert!(file.ends_with("bad.js")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_error_in_walk_order_wins() {
        let project = Project::new(&[
            ("index.js", "require('./a'); require('./b')"),
            ("a.js", "require('./missing')"),
            ("b.js", "let = ;"),
        ]);

        for _ in 0..4 {
            let err = project.resolve().unwrap_err();
            assert!(matches!(err, SnapshotError::ModuleResolution { .. }));
        }
    }
}
