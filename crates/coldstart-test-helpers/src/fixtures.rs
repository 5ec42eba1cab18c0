//! Test fixtures - throwaway project trees on disk

use indoc::indoc;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project directory, removed on drop
pub struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        // Canonical so paths agree with what the resolver reports on macOS
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let project = Self::new();
        for (rel, content) in files {
            project.write(rel, content);
        }
        project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry `index.js` of [`module_project`]
pub const MODULE_PROJECT_INDEX: &str = indoc! {"
    const a = require('a')
    const b = require('./b')
    const c = require('./dir/c.json')
    const path = require('path')

    global.initialize = function () {
      global.moduleInitialized = true
      return a.name + b.name + path.join('x', 'y') + c.suffix
    }
"};

/// Entry `index.js` with a package from `node_modules`, a sibling `b.js`
/// meant to be excluded, a JSON file and a builtin. `initialize()` returns
/// `"abx/ybAd"`.
pub fn module_project() -> Project {
    Project::with_files(&[
        ("project/index.js", MODULE_PROJECT_INDEX),
        ("project/b.js", "module.exports = { name: 'b' }\n"),
        (
            "project/dir/c.json",
            indoc! {r#"
                {
                  "kind": "fixture",
                  "suffix": "bAd"
                }
            "#},
        ),
        ("project/node_modules/a/package.json", r#"{ "main": "index.js" }"#),
        (
            "project/node_modules/a/index.js",
            indoc! {"
                const name = 'a'
                module.exports = { name }
            "},
        ),
    ])
}

/// `a.js` requires `./d` and `./e`, which require each other. Meant to be run
/// with `d.js` and `e.js` excluded. `cyclicRequire()` returns
/// `{a: 'a', b: 'b', d: 'd', e: 'e'}`.
pub fn cyclic_project() -> Project {
    Project::with_files(&[
        (
            "cyclic/a.js",
            indoc! {"
                global.cyclicRequire = function () {
                  const d = require('./d')
                  const e = require('./e')
                  return { a: 'a', b: require('./b'), d: d.name, e: e.name }
                }
            "},
        ),
        ("cyclic/b.js", "module.exports = 'b'\n"),
        ("cyclic/d.js", "exports.name = 'd'\nexports.peer = require('./e')\n"),
        ("cyclic/e.js", "exports.name = 'e'\nexports.peer = require('./d')\n"),
    ])
}

/// Entry that captures `process.platform` at load time
pub fn platform_project() -> Project {
    Project::with_files(&[(
        "platform/index.js",
        "global.module2 = { platform: process.platform }\n",
    )])
}

/// Predicate excluding files whose name ends with one of `suffixes`
pub fn exclude_suffixes(suffixes: &'static [&'static str]) -> impl Fn(&Path) -> bool + Send + Sync {
    move |path: &Path| {
        let path = path.to_string_lossy();
        suffixes.iter().any(|suffix| path.ends_with(suffix))
    }
}
