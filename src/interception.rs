//! Module interception registry.
//!
//! A resolver table keyed by dotted extension. The module loader asks the realm for a stub before
//! parsing a file; when the extension is registered, the stub value replaces the module's value and
//! the file is never executed. Registration is last-write-wins and never removes entries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use testrealm_core::StubKind;
use testrealm_core::extensions::{self, KNOWN_ASSET_TYPES, STYLE_TYPES};
use tracing::debug;

use crate::config::WorkerConfig;
use crate::realm::Realm;

/// Produces the module value for an intercepted import id.
pub type StubResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
struct Interceptor {
    kind: StubKind,
    resolver: StubResolver,
}

/// Extension → stub resolver table.
#[derive(Clone, Default)]
pub struct InterceptionTable {
    entries: HashMap<String, Interceptor>,
}

impl InterceptionTable {
    /// Register `resolver` for every extension (dotted, e.g. `.css`, matched case-sensitively).
    /// Existing entries are replaced.
    pub fn install<I, S>(&mut self, extensions: I, kind: StubKind, resolver: StubResolver)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            self.entries.insert(
                ext.as_ref().to_string(),
                Interceptor {
                    kind,
                    resolver: Arc::clone(&resolver),
                },
            );
        }
    }

    /// Resolve the stub value for an import id, or `None` if its extension is not intercepted.
    pub fn resolve(&self, id: &str) -> Option<String> {
        let ext = extensions::extension_of(id)?;
        self.entries.get(&ext).map(|i| (i.resolver)(id))
    }

    pub fn kind_of(&self, ext: &str) -> Option<StubKind> {
        self.entries.get(ext).map(|i| i.kind)
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<(String, StubKind)> {
        let mut out: Vec<_> = self.entries.iter().map(|(k, i)| (k.clone(), i.kind)).collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Style sheets cannot be processed inside the realm; they evaluate to an empty string.
pub fn resolve_style(_id: &str) -> String {
    String::new()
}

/// Resolve an asset id to the URL a bundler would hand out.
///
/// Without an asset base the id itself is the URL. With one, the id is made relative to `root` when it
/// lives under it (whole path components only) and appended to the base with forward slashes.
pub fn resolve_asset_url(id: &str, root: &str, asset_base: Option<&str>) -> String {
    let Some(base) = asset_base else {
        return id.to_string();
    };
    let relative = match Path::new(id).strip_prefix(root) {
        Ok(rel) if !root.is_empty() => rel.to_string_lossy().into_owned(),
        _ => id.to_string(),
    };
    let relative = relative.trim_start_matches(['/', '\\']).replace('\\', "/");
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

fn asset_resolver(config: &WorkerConfig) -> StubResolver {
    let root = config.root.to_string_lossy().into_owned();
    let base = config.asset_base.clone();
    Arc::new(move |id: &str| resolve_asset_url(id, &root, base.as_deref()))
}

/// Register the style and asset stubs a client-like (`web`) realm needs.
pub fn install_web_stubs(realm: &Realm, config: &WorkerConfig) {
    realm.with_interceptors(|table| {
        table.install(
            STYLE_TYPES.iter().map(|t| extensions::dotted(t)),
            StubKind::Style,
            Arc::new(resolve_style),
        );
        table.install(
            KNOWN_ASSET_TYPES.iter().map(|t| extensions::dotted(t)),
            StubKind::Asset,
            asset_resolver(config),
        );
        debug!(extensions = table.len(), "installed module interception stubs");
    });
}
