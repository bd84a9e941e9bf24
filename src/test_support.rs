//! Throw-away local HTTP servers for exercising the outbound clients.

use axum::Router;

/// Serve `app` on an ephemeral localhost port; returns its base URL (no trailing slash).
pub async fn serve(app: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{addr}")
}
