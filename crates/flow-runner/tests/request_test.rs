//! Request runner behavior against a local HTTP stub.

use std::collections::HashMap;
use std::sync::Arc;

use flow_context::ExecutionContext;
use flow_engine::{Engine, ExecEngine};
use flow_runner::{RequestRunner, Runner, RunnerError};
use flow_types::{
  Directory, Executable, HttpMethod, RequestSpec, ResponseFileSpec, SaveFormat, Verb, Workspace,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve a fixed response for every connection on an ephemeral port.
async fn spawn_stub(status_line: &'static str, body: &'static str) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    loop {
      let Ok((mut socket, _)) = listener.accept().await else {
        break;
      };
      tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let response = format!(
          "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
          body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
      });
    }
  });

  format!("http://{addr}")
}

fn request_executable(ws_path: &std::path::Path, spec: RequestSpec) -> Arc<Executable> {
  let mut executable = Executable::default();
  executable.verb = Verb::Exec;
  executable.name = "call".to_string();
  executable.request = Some(spec);
  executable.set_context("ws", ws_path, "ns", ws_path.join("test.flow"));
  Arc::new(executable)
}

fn test_context(ws_path: &std::path::Path) -> Arc<ExecutionContext> {
  ExecutionContext::builder()
    .workspace(Workspace::load("ws", ws_path).unwrap())
    .namespace("ns")
    .build()
}

fn engine() -> Arc<dyn Engine> {
  Arc::new(ExecEngine::new())
}

#[tokio::test]
async fn get_request_succeeds_on_valid_status() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("200 OK", r#"{"message": "GET request successful"}"#).await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url,
      method: HttpMethod::GET,
      log_response: true,
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap();
  ctx.finalize();
}

#[tokio::test]
async fn unexpected_status_code_fails() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("500 Internal Server Error", "boom").await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url,
      valid_status_codes: vec![200],
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  let err = RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap_err();
  ctx.finalize();

  match err {
    RunnerError::UnexpectedStatusCode { status, .. } => assert_eq!(status, 500),
    other => panic!("expected unexpected status code error, got {other}"),
  }
}

#[tokio::test]
async fn default_valid_codes_accept_2xx() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("204 No Content", "").await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url,
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap();
  ctx.finalize();
}

#[tokio::test]
async fn transformed_response_is_persisted() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("200 OK", "ok").await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url,
      transform_response: "upper(body)".to_string(),
      response_file: Some(ResponseFileSpec {
        filename: "response.txt".to_string(),
        dir: Directory::from("//"),
        save_as: SaveFormat::Raw,
      }),
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap();
  ctx.finalize();

  let saved = std::fs::read_to_string(ws.path().join("response.txt")).unwrap();
  assert_eq!(saved, "OK");
}

#[tokio::test]
async fn json_response_file_is_reserialized() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("200 OK", r#"{"key":"value"}"#).await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url,
      method: HttpMethod::POST,
      body: r#"{"key":"value"}"#.to_string(),
      response_file: Some(ResponseFileSpec {
        filename: "response.json".to_string(),
        dir: Directory::from("//"),
        save_as: SaveFormat::Json,
      }),
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap();
  ctx.finalize();

  let saved = std::fs::read_to_string(ws.path().join("response.json")).unwrap();
  let parsed: serde_json::Value = serde_json::from_str(&saved).unwrap();
  assert_eq!(parsed["key"], "value");
}

#[tokio::test]
async fn url_env_references_expand() {
  let ws = tempfile::tempdir().unwrap();
  let url = spawn_stub("200 OK", "ok").await;

  let executable = request_executable(
    ws.path(),
    RequestSpec {
      url: "${BASE_URL}".to_string(),
      ..Default::default()
    },
  );

  let ctx = test_context(ws.path());
  let input_env = HashMap::from([("BASE_URL".to_string(), url)]);
  RequestRunner
    .exec(
      ctx.clone(),
      executable,
      engine(),
      CancellationToken::new(),
      input_env,
      Vec::new(),
    )
    .await
    .unwrap();
  ctx.finalize();
}
