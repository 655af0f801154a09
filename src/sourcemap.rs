//! Source map support for stack traces.
//!
//! Installing support on a realm wires position translation to a lookup function, normally the module
//! loader's cache. Misses are never errors: a frame without a map keeps its generated position.
//!
//! Decoding is done by the `sourcemap` crate; this module only adapts its one-based stack-trace
//! positions and wires lookups to the realm.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::realm::Realm;

/// Error decoding a source map.
pub type SourceMapError = ::sourcemap::Error;

/// A position in original source. `line` and `column` are one-based, like stack traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// A decoded source map.
pub struct SourceMap {
    inner: ::sourcemap::SourceMap,
}

impl SourceMap {
    /// Decode a v3 source map.
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        Ok(Self {
            inner: ::sourcemap::SourceMap::from_slice(json.as_bytes())?,
        })
    }

    /// Translate a one-based generated position.
    ///
    /// Picks the closest mapping at or before `column` on the same generated line.
    pub fn original_position(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let line = line.checked_sub(1)?;
        let token = self.inner.lookup_token(line, column.saturating_sub(1))?;
        if token.get_dst_line() != line {
            return None;
        }

        Some(OriginalPosition {
            source: token.get_source()?.to_string(),
            line: token.get_src_line() + 1,
            column: token.get_src_col() + 1,
            name: token.get_name().map(str::to_string),
        })
    }

    pub fn sources(&self) -> Vec<String> {
        self.inner.sources().map(str::to_string).collect()
    }
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMap")
            .field("sources", &self.sources())
            .finish_non_exhaustive()
    }
}

/// Looks up the source map for a generated source id.
pub type SourceMapLookup = Arc<dyn Fn(&str) -> Option<Arc<SourceMap>> + Send + Sync>;

/// Position translation installed on a realm.
pub struct SourceMapSupport {
    lookup: SourceMapLookup,
}

impl SourceMapSupport {
    pub fn new(lookup: SourceMapLookup) -> Self {
        Self { lookup }
    }

    /// Original position of a one-based generated position, if a map covers it.
    pub fn original_position(&self, source: &str, line: u32, column: u32) -> Option<OriginalPosition> {
        (self.lookup)(source)?.original_position(line, column)
    }

    /// Rewrite every `path:line:column` frame of a stack trace that a source map covers.
    ///
    /// Handles both `at fn (path:1:2)` and `at path:1:2` frames; other lines pass through unchanged.
    pub fn map_stack_trace(&self, stack: &str) -> String {
        stack
            .lines()
            .map(|line| self.map_frame(line).unwrap_or_else(|| line.to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn map_frame(&self, frame: &str) -> Option<String> {
        let rest = frame.trim_start().strip_prefix("at ")?;
        let (start, end) = if rest.ends_with(')') {
            (frame.rfind('(')? + 1, frame.len() - 1)
        } else {
            (frame.len() - rest.len(), frame.len())
        };

        let (source, line, column) = split_location(&frame[start..end])?;
        let pos = self.original_position(source, line, column)?;
        Some(format!(
            "{}{}:{}:{}{}",
            &frame[..start],
            pos.source,
            pos.line,
            pos.column,
            &frame[end..]
        ))
    }
}

fn split_location(location: &str) -> Option<(&str, u32, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    let source = parts.next()?;
    Some((source, line, column))
}

/// Install source map support on the realm.
pub fn install(realm: &Realm, lookup: SourceMapLookup) {
    realm.set_source_maps(Arc::new(SourceMapSupport::new(lookup)));
    debug!("installed source map support");
}
