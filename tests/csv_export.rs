mod common;

use anyhow::Result;
use serde_json::Value;

use common::{complaint_body, send, spawn_app, user_token};

/// Serves the router on an ephemeral port and returns its base URL.
async fn serve(app: axum::Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn complaints_export_as_an_attachment() -> Result<()> {
    let t = spawn_app().await?;
    let token = user_token(&t, "admin@example.org", true, &["admin"]).await?;

    let mut tricky = complaint_body("Doe, \"JD\" Jane");
    tricky["description"] = Value::String("line one\nline two".into());
    send(&t.app, "POST", "/api/complaints", None, Some(tricky)).await?;
    send(&t.app, "POST", "/api/complaints", None, Some(complaint_body("Plain"))).await?;

    let base = serve(t.app.clone()).await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/api/complaints/export/csv?sort_column=full_name&sort_order=asc"))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"), "{content_type}");
    let disposition = resp
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"complaints-"), "{disposition}");
    assert!(disposition.ends_with(".csv\""));

    let text = resp.text().await?;
    assert!(text.starts_with("Sample ID,Type,Full Name,Email"));
    assert!(text.contains("\"Doe, \"\"JD\"\" Jane\""));
    assert!(text.contains("\"line one\nline two\""));
    assert!(text.contains("COMP-2,Excessive Delay in Report,Plain,citizen@example.org"));
    Ok(())
}

#[tokio::test]
async fn export_requires_admin() -> Result<()> {
    let t = spawn_app().await?;
    let base = serve(t.app.clone()).await?;

    let resp = reqwest::get(format!("{base}/api/requests/export/csv")).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    Ok(())
}
