use std::time::Duration;

use loadcheck_http::{ErrorKind, HttpClient, HttpRequest};
use loadcheck_testserver::TestServer;
use serde_json::json;

#[tokio::test]
async fn post_json_creates_user() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let payload = json!({ "name": "morpheus", "job": "leader" });
    let req = HttpRequest::post(server.url("/api/users")).json(&payload);
    let res = client.send(req).await?;

    anyhow::ensure!(res.status == 201, "status = {}", res.status);
    let body = res.json().ok_or_else(|| anyhow::anyhow!("body is not json"))?;
    anyhow::ensure!(body["name"] == "morpheus");
    anyhow::ensure!(body["job"] == "leader");
    anyhow::ensure!(body["id"].is_string());
    anyhow::ensure!(res.bytes_sent > payload.to_string().len() as u64);
    anyhow::ensure!(res.bytes_received > res.body.len() as u64);
    anyhow::ensure!(server.stats().users_created() == 1);
    anyhow::ensure!(server.stats().saw_json_content_type() == 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn put_updates_user() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::put(server.url("/api/users/2"))
        .json(&json!({ "name": "morpheus", "job": "zion resident" }));
    let res = client.send(req).await?;

    anyhow::ensure!(res.status == 200, "status = {}", res.status);
    let body = res.json().ok_or_else(|| anyhow::anyhow!("body is not json"))?;
    anyhow::ensure!(body["job"] == "zion resident");
    anyhow::ensure!(body["updatedAt"].is_string());
    anyhow::ensure!(res.header("content-type") == Some("application/json"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn request_timeout_is_reported() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::get(server.url("/slow?ms=500")).timeout(Duration::from_millis(50));
    match client.send(req).await {
        Err(err) => anyhow::ensure!(err.kind() == ErrorKind::Timeout, "{err}"),
        Ok(res) => anyhow::bail!("expected timeout, got status {}", res.status),
    }

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unknown_user_is_404() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let res = HttpClient::default()
        .send(HttpRequest::get(server.url("/api/users/23")))
        .await?;
    anyhow::ensure!(res.status == 404);
    server.shutdown().await;
    Ok(())
}
