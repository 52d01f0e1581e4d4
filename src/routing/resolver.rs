//! Static resource resolution.
//!
//! # Responsibilities
//! - Map an authenticated request path to a file under the assets root
//! - Derive the content type (and text vs binary handling) from the extension
//! - Hand everything else to the dynamic handler
//!
//! # Path Shapes
//! ```text
//! /app              → redirect to /app/
//! /app/             → <root>/app/<home_page> if present, else dynamic
//! /app/page.html    → <root>/<asset_folder>/page.html
//! /app/html/x.css   → <root>/<asset_folder>/x.css
//! anything else     → dynamic
//! ```
//!
//! # Design Decisions
//! - Segments starting with `.` never resolve to files, so `..` cannot escape the root
//! - A matched static route whose file is missing is a 404, never a
//!   fall-through to the handler

use std::path::{Path, PathBuf};

use crate::config::ApplicationConfig;
use crate::error::GateError;

/// How a file's bytes are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub mime: &'static str,
    /// Binary payloads are passed through untouched; text goes through
    /// template substitution.
    pub binary: bool,
}

impl ContentType {
    const HTML: ContentType = ContentType::text("text/html; charset=utf-8");

    const fn text(mime: &'static str) -> Self {
        Self { mime, binary: false }
    }

    const fn image(mime: &'static str) -> Self {
        Self { mime, binary: true }
    }

    /// Content type for a file name, defaulting to HTML.
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "js" => Self::text("application/javascript; charset=utf-8"),
            "css" => Self::text("text/css; charset=utf-8"),
            "json" => Self::text("application/json"),
            "svg" => Self::text("image/svg+xml"),
            "jpg" | "jpeg" => Self::image("image/jpeg"),
            "png" => Self::image("image/png"),
            "gif" => Self::image("image/gif"),
            "ico" => Self::image("image/x-icon"),
            _ => Self::HTML,
        }
    }
}

/// Disposition of a request after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    StaticFile { path: PathBuf, content_type: ContentType },
    Redirect(String),
    Dynamic,
}

/// Classifies request paths against the asset tree.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    app: String,
    assets_root: PathBuf,
    asset_folder: String,
    home_page: String,
}

impl StaticResolver {
    pub fn new(config: &ApplicationConfig) -> Self {
        Self {
            app: config.name.clone(),
            assets_root: PathBuf::from(&config.assets_root),
            asset_folder: config.asset_folder.clone(),
            home_page: config.home_page.clone(),
        }
    }

    /// Application root with its trailing separator, e.g. `/app/`.
    pub fn app_root(&self) -> String {
        format!("/{}/", self.app)
    }

    /// Classify `path`. Paths outside the application prefix are a 404.
    pub fn classify(&self, path: &str) -> Result<RouteOutcome, GateError> {
        let bare_root = format!("/{}", self.app);
        if path == bare_root {
            return Ok(RouteOutcome::Redirect(self.app_root()));
        }

        let rest = path
            .strip_prefix(&bare_root)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| GateError::not_found(format!("Not found: {}", path)))?;

        let segments: Vec<&str> = rest.split('/').collect();
        let outcome = match segments.as_slice() {
            [""] => self.home_page_route(),
            [name] if is_file_name(name) && has_extension(name) => {
                self.asset_route(name)
            }
            [folder, name] if *folder == self.asset_folder && is_file_name(name) => {
                self.asset_route(name)
            }
            _ => RouteOutcome::Dynamic,
        };

        tracing::trace!(path = %path, outcome = ?outcome, "Path classified");
        Ok(outcome)
    }

    fn home_page_route(&self) -> RouteOutcome {
        let path = self.assets_root.join(&self.app).join(&self.home_page);
        if path.is_file() {
            let content_type = ContentType::for_path(&path);
            RouteOutcome::StaticFile { path, content_type }
        } else {
            RouteOutcome::Dynamic
        }
    }

    fn asset_route(&self, name: &str) -> RouteOutcome {
        let path = self.assets_root.join(&self.asset_folder).join(name);
        let content_type = ContentType::for_path(&path);
        RouteOutcome::StaticFile { path, content_type }
    }
}

fn is_file_name(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.contains(&['\\', '\0'][..])
}

fn has_extension(segment: &str) -> bool {
    matches!(segment.rsplit_once('.'), Some((stem, ext)) if !stem.is_empty() && !ext.is_empty())
}
