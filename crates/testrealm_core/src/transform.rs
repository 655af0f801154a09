//! Transform-mode tags declared by environments.

use crate::globals::{SSR_CLIENT_VALUE, SSR_SERVER_VALUE};

/// Whether an environment emulates a client (`web`) or a server-like runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformMode {
    Web,
    #[default]
    Ssr,
}

impl TransformMode {
    /// Resolve a tag. Anything other than `web` is server-like.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "web" { TransformMode::Web } else { TransformMode::Ssr }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransformMode::Web => "web",
            TransformMode::Ssr => "ssr",
        }
    }

    /// Value of the `SSR` environment variable for this mode.
    pub fn ssr_value(self) -> &'static str {
        match self {
            TransformMode::Web => SSR_CLIENT_VALUE,
            TransformMode::Ssr => SSR_SERVER_VALUE,
        }
    }
}
