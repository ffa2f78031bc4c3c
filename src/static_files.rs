//! Static content serving, delegated to `tower-http`.
use std::path::Path;

use tower_http::services::ServeDir;

/// Build a request handler serving files rooted at the resolved absolute
/// path. Serving semantics (ranges, conditional requests, mime types) belong
/// to [`ServeDir`]; this is only the factory.
///
/// Mount the result on the application with
/// [`App::nest_service`](crate::App::nest_service).
pub fn static_content(local_path: impl AsRef<Path>) -> ServeDir {
    let local_path = local_path.as_ref();
    let root = std::path::absolute(local_path).unwrap_or_else(|_| local_path.to_path_buf());

    ServeDir::new(root).append_index_html_on_directories(true)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt; // for oneshot

    use super::*;

    #[tokio::test]
    async fn test_serves_file_under_root() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(temp_dir.path().join("hello.txt"), "hello from disk")
            .await
            .unwrap();

        let service = static_content(temp_dir.path());
        let response = service
            .oneshot(
                Request::builder()
                    .uri("/hello.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello from disk");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let service = static_content(temp_dir.path());
        let response = service
            .oneshot(
                Request::builder()
                    .uri("/absent.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
