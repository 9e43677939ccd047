//! TypeScript to JavaScript transpilation
//!
//! Wraps `deno_ast` (swc). User code is parsed as a classic script, since it
//! ends up as a `Function` body; `import`/`export` declarations are rejected
//! here rather than inside the isolate. Every transpilation emits a separate
//! source map so runtime failures can be traced back to the caller's source.

use crate::config::{SourceLanguage, TranspileConfig};
use crate::error::{Result, SandboxError};
use deno_ast::{
    EmitOptions, MediaType, ModuleSpecifier, ParseParams, SourceMapOption, TranspileModuleOptions,
    TranspileOptions,
};

/// Opaque source-map artifact correlating transpiled output with the original
/// code. Holds the source-map JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapData(String);

impl SourceMapData {
    pub fn new(json: impl Into<String>) -> Self {
        Self(json.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn parse(&self) -> Option<sourcemap::SourceMap> {
        match sourcemap::SourceMap::from_slice(self.0.as_bytes()) {
            Ok(map) => Some(map),
            Err(err) => {
                tracing::debug!(error = %err, "Source map could not be parsed");
                None
            }
        }
    }
}

/// Output of a successful transpilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspilationResult {
    /// Directly executable JavaScript
    pub output: String,
    pub source_map: SourceMapData,
}

/// Stateless transpiler; cheap to clone
#[derive(Debug, Clone)]
pub struct Transpiler {
    specifier: ModuleSpecifier,
    media_type: MediaType,
}

impl Transpiler {
    pub fn new(config: &TranspileConfig) -> Result<Self> {
        let specifier = ModuleSpecifier::parse(&config.specifier).map_err(|e| {
            SandboxError::Config(format!("Invalid specifier '{}': {}", config.specifier, e))
        })?;
        let media_type = match config.language {
            SourceLanguage::TypeScript => MediaType::TypeScript,
            SourceLanguage::JavaScript => MediaType::JavaScript,
        };

        Ok(Self {
            specifier,
            media_type,
        })
    }

    /// Transpile `code`, failing loudly on any syntax error or module syntax.
    #[tracing::instrument(level = "debug", skip_all, fields(code_len = code.len()))]
    pub fn transpile(&self, code: &str) -> Result<TranspilationResult> {
        let parsed = deno_ast::parse_script(ParseParams {
            specifier: self.specifier.clone(),
            text: code.into(),
            media_type: self.media_type,
            capture_tokens: false,
            scope_analysis: false,
            maybe_syntax: None,
        })
        .map_err(|e| SandboxError::Transpile(e.to_string()))?;

        let emit_options = EmitOptions {
            source_map: SourceMapOption::Separate,
            inline_sources: true,
            ..Default::default()
        };
        let emitted = parsed
            .transpile(
                &TranspileOptions::default(),
                &TranspileModuleOptions::default(),
                &emit_options,
            )
            .map_err(|e| SandboxError::Transpile(e.to_string()))?
            .into_source();

        let source_map = emitted.source_map.ok_or_else(|| {
            SandboxError::Transpile("transpiler produced no source map".to_string())
        })?;

        tracing::debug!(output_len = emitted.text.len(), "Transpiled user code");

        Ok(TranspilationResult {
            output: emitted.text,
            source_map: SourceMapData::new(source_map),
        })
    }
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new(&TranspileConfig::default()).expect("default specifier is a valid URL")
    }
}
