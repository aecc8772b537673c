//! Cached CouchDB handles against a scripted HTTP server.
//!
//! The server keeps one document `x` whose revision the test can bump to
//! simulate another writer, and counts the document reads it serves.

use couchkit::connection::{update, ConnectionConfig, Database};
use couchkit::facade::{remove_entry, update_entry};
use couchkit::store::{CouchConnection, Document, StoreError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const DB: &str = "cachedb";

struct FakeCouch {
    rev: Mutex<String>,
    reads: AtomicUsize,
}

impl FakeCouch {
    fn current_rev(&self) -> String {
        self.rev.lock().unwrap().clone()
    }

    /// Another client wrote the document.
    fn bump(&self) {
        let mut rev = self.rev.lock().unwrap();
        let generation: u64 = rev.split('-').next().unwrap().parse().unwrap();
        *rev = format!("{}-server", generation + 1);
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn respond(&self, method: &str, target: &str, body: &[u8]) -> (u16, Option<Value>) {
        let doc_path = format!("/{}/x", DB);
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        match (method, path) {
            ("HEAD", p) if p == format!("/{}", DB) => (200, None),
            ("GET", p) if p == doc_path => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                (200, Some(json!({"_id": "x", "_rev": self.current_rev(), "v": 1})))
            }
            ("PUT", p) if p == doc_path => {
                let doc: Value = serde_json::from_slice(body).unwrap();
                if doc["_rev"].as_str() == Some(self.current_rev().as_str()) {
                    self.bump();
                    (201, Some(json!({"ok": true, "id": "x", "rev": self.current_rev()})))
                } else {
                    (409, Some(json!({"error": "conflict", "reason": "Document update conflict."})))
                }
            }
            ("DELETE", p) if p == doc_path => {
                if query == format!("rev={}", self.current_rev()) {
                    self.bump();
                    (200, Some(json!({"ok": true, "id": "x", "rev": self.current_rev()})))
                } else {
                    (409, Some(json!({"error": "conflict", "reason": "Document update conflict."})))
                }
            }
            _ => (404, Some(json!({"error": "not_found", "reason": "missing"}))),
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<(String, String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let length: usize = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok((method, target, body))
}

async fn serve(mut stream: TcpStream, server: Arc<FakeCouch>) {
    let Ok((method, target, body)) = read_request(&mut stream).await else {
        return;
    };
    let (status, reply) = server.respond(&method, &target, &body);
    let payload = reply.map(|v| v.to_string()).unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        if method == "HEAD" { "" } else { payload.as_str() }
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn start_server() -> (Arc<FakeCouch>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = Arc::new(FakeCouch {
        rev: Mutex::new("1-server".to_string()),
        reads: AtomicUsize::new(0),
    });

    let state = Arc::clone(&server);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, Arc::clone(&state)));
        }
    });

    (server, port)
}

async fn cached_database(port: u16) -> Database {
    let config = ConnectionConfig {
        port,
        cache: true,
        ..ConnectionConfig::default()
    };
    let conn = CouchConnection::new(config).unwrap();
    update(&conn, DB).await.unwrap()
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("test documents must be objects"),
    }
}

#[tokio::test]
async fn test_update_entry_rereads_revision_past_cache() {
    let (server, port) = start_server().await;
    let db = cached_database(port).await;

    // Fill the cache, then let another writer move the document on
    assert_eq!(db.store().get("x").await.unwrap()["_rev"], json!("1-server"));
    server.bump();

    for _ in 0..3 {
        assert!(update_entry(&db, "x", doc(json!({"v": 2}))).await.unwrap());
    }
    assert_eq!(server.reads(), 4);
    assert_eq!(server.current_rev(), "5-server");
}

#[tokio::test]
async fn test_remove_entry_rereads_revision_past_cache() {
    let (server, port) = start_server().await;
    let db = cached_database(port).await;

    db.store().get("x").await.unwrap();
    server.bump();

    assert!(remove_entry(&db, "x").await.unwrap());
    assert_eq!(server.reads(), 2);
}

#[tokio::test]
async fn test_conflict_evicts_cached_document() {
    let (server, port) = start_server().await;
    let db = cached_database(port).await;

    let cached = db.store().get("x").await.unwrap();
    // Served from the cache
    db.store().get("x").await.unwrap();
    assert_eq!(server.reads(), 1);

    server.bump();
    let stale = cached["_rev"].as_str().unwrap();
    let err = db
        .store()
        .save_revision("x", stale, doc(json!({"v": 3})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // The next read goes back to the server and sees the new revision
    let fresh = db.store().get("x").await.unwrap();
    assert_eq!(server.reads(), 2);
    assert_eq!(fresh["_rev"], json!("2-server"));
}
