//! Source transform collaborator
//!
//! The resolver only needs two things from a transform: the code to embed and
//! the literal require specifiers it contains, in source order. Any
//! transpiler can sit behind [`Transform`]; [`RequireScanTransform`] is the
//! default and leaves the code untouched.

use indexmap::IndexSet;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, CallExpression, Expression};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;
use std::path::Path;
use thiserror::Error;

/// Result of transforming one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    pub requires: Vec<String>,
}

/// The source could not be transformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformFailure {
    pub message: String,
}

impl TransformFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait Transform: Send + Sync {
    fn transform(&self, source: &str, file_path: &Path)
        -> Result<TransformOutput, TransformFailure>;
}

/// Parses the file and collects `require("...")` calls with a literal
/// argument. Duplicate specifiers keep their first position.
///
/// A leading hashbang line is blanked so the code can be wrapped in a function
/// without shifting line numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireScanTransform;

impl RequireScanTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for RequireScanTransform {
    fn transform(
        &self,
        source: &str,
        file_path: &Path,
    ) -> Result<TransformOutput, TransformFailure> {
        if has_extension(file_path, "json") {
            return Ok(TransformOutput {
                code: source.to_string(),
                requires: Vec::new(),
            });
        }

        let allocator = Allocator::default();
        let options = ParseOptions {
            allow_return_outside_function: true,
            ..ParseOptions::default()
        };
        let ret = Parser::new(&allocator, source, source_type_for(file_path))
            .with_options(options)
            .parse();

        if ret.panicked || !ret.errors.is_empty() {
            let message = ret
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TransformFailure::new(if message.is_empty() {
                "parser aborted".to_string()
            } else {
                message
            }));
        }

        let mut collector = RequireCollector::default();
        collector.visit_program(&ret.program);

        Ok(TransformOutput {
            code: blank_hashbang(source),
            requires: collector.specifiers.into_iter().collect(),
        })
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn source_type_for(file_path: &Path) -> SourceType {
    match file_path.extension().and_then(|e| e.to_str()) {
        None | Some("js") | Some("cjs") => SourceType::cjs(),
        Some(_) => SourceType::from_path(file_path).unwrap_or_else(|_| SourceType::cjs()),
    }
}

fn blank_hashbang(source: &str) -> String {
    if !source.starts_with("#!") {
        return source.to_string();
    }
    match source.find('\n') {
        Some(end) => source[end..].to_string(),
        None => String::new(),
    }
}

#[derive(Debug, Default)]
struct RequireCollector {
    specifiers: IndexSet<String>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        let is_require = matches!(
            &it.callee,
            Expression::Identifier(ident) if ident.name.as_str() == "require"
        );
        if is_require && it.arguments.len() == 1 {
            if let Some(Argument::StringLiteral(lit)) = it.arguments.first() {
                self.specifiers.insert(lit.value.to_string());
            }
        }
        walk::walk_call_expression(self, it);
    }
}
