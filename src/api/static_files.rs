use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use rust_embed::RustEmbed;
use std::path::{Component, PathBuf};

#[derive(RustEmbed)]
#[folder = "assets"]
pub struct Assets;

/// Serve static files from the filesystem override or the embedded page
pub async fn serve_static(uri: Uri, static_dir: Option<String>) -> Response {
    let path = uri.path().trim_start_matches('/');

    // Try to serve from filesystem if static_dir is provided
    if let Some(ref dir) = static_dir {
        if let Some(file_path) = resolve_within(dir, path) {
            if let Ok(content) = tokio::fs::read(&file_path).await {
                let mime_type = from_path(&file_path).first_or_octet_stream();
                return (
                    [(header::CONTENT_TYPE, mime_type.as_ref().to_string())],
                    Body::from(content),
                )
                    .into_response();
            }
        }
    }

    // Fall back to embedded assets
    serve_embedded(path)
}

/// Join `path` onto `dir`, refusing anything that could climb out of it
fn resolve_within(dir: &str, path: &str) -> Option<PathBuf> {
    let relative = PathBuf::from(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(PathBuf::from(dir).join(relative))
}

/// Serve from embedded assets
fn serve_embedded(path: &str) -> Response {
    let path = if path.is_empty() { "index.html" } else { path };

    match Assets::get(path) {
        Some(content) => {
            let mime = from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                Body::from(content.data),
            )
                .into_response()
        }
        None => {
            // Extensionless paths get the page itself
            if !path.contains('.') {
                if let Some(index) = Assets::get("index.html") {
                    return (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8".to_string())],
                        Body::from(index.data),
                    )
                        .into_response();
                }
            }
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_within_rejects_traversal() {
        assert!(resolve_within("/srv", "../etc/passwd").is_none());
        assert!(resolve_within("/srv", "/etc/passwd").is_none());
        assert_eq!(
            resolve_within("/srv", "img/perfil.png"),
            Some(PathBuf::from("/srv/img/perfil.png"))
        );
    }

    #[test]
    fn test_embedded_index_served_for_root() {
        let response = serve_embedded("");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_missing_asset_is_404() {
        let response = serve_embedded("missing.png");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
