use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use nycbus::{ClientConfig, Error, ErrorKind, RestTable, RowFilter, RowSet, Table, TableName};

const M86: &str = "MTA/M86-SBS/1496275200000/NYCT_5824";
const M86_OTHER: &str = "MTA/M86-SBS/1496275200000/NYCT_5830";

/// One step of a canned HTTP exchange, played after the request is read.
enum Step {
    Write(String),
    /// Wait for the client to signal; records whether it did so in time.
    Await(oneshot::Receiver<()>),
    /// Keep the connection open without sending anything.
    Stall(Duration),
}

struct Served {
    head: String,
    body: Value,
    signalled: Vec<bool>,
}

fn response_head(status: &str) -> String {
    format!("HTTP/1.1 {status}\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n")
}

fn row(key: &str, lat: &str, long: &str) -> Value {
    json!({ "chunks": [
        {
            "rowKey": STANDARD.encode(key),
            "familyName": "cf",
            "qualifier": STANDARD.encode("VehicleLocation.Latitude"),
            "timestampMicros": "1000",
            "value": STANDARD.encode(lat),
        },
        {
            "qualifier": STANDARD.encode("VehicleLocation.Longitude"),
            "timestampMicros": "1000",
            "value": STANDARD.encode(long),
            "commitRow": true,
        },
    ]})
}

async fn read_request(socket: &mut TcpStream) -> Result<(String, Value)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let len = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            while buf.len() < start + len {
                let n = socket.read(&mut chunk).await?;
                if n == 0 {
                    bail!("connection closed inside request body");
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = serde_json::from_slice(&buf[start..start + len])?;
            return Ok((head, body));
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            bail!("connection closed before request");
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Accept one connection, read the request and play `script` back.
async fn serve(script: Vec<Step>) -> Result<(SocketAddr, JoinHandle<Result<Served>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let (head, body) = read_request(&mut socket).await?;
        let mut signalled = Vec::new();
        for step in script {
            match step {
                Step::Write(text) => {
                    socket.write_all(text.as_bytes()).await?;
                    socket.flush().await?;
                }
                Step::Await(rx) => {
                    let arrived = tokio::time::timeout(Duration::from_secs(5), rx).await;
                    signalled.push(matches!(arrived, Ok(Ok(()))));
                }
                Step::Stall(period) => tokio::time::sleep(period).await,
            }
        }
        socket.shutdown().await.ok();
        Ok(Served {
            head,
            body,
            signalled,
        })
    });
    Ok((addr, handle))
}

fn table_at(addr: SocketAddr) -> Result<RestTable> {
    let mut config = ClientConfig::new(TableName::new("my-project", "bus-instance", "bus-data"));
    config.endpoint = format!("http://{addr}");
    config.access_token = Some("test-token".into());
    config.timeout = Duration::from_secs(5);
    Ok(RestTable::new(config)?)
}

async fn collect_keys(table: &RestTable, rows: &RowSet) -> (Vec<String>, nycbus::Result<()>) {
    let mut keys = Vec::new();
    let result = table
        .read_rows(rows, None, |row| {
            keys.push(row.key().to_string());
            Ok(true)
        })
        .await;
    (keys, result)
}

#[tokio::test]
async fn not_found_reports_status_payload() -> Result<()> {
    let error = json!({ "error": { "code": 404, "message": "table not found", "status": "NOT_FOUND" } });
    let (addr, server) = serve(vec![Step::Write(format!(
        "{}{error}",
        response_head("404 Not Found")
    ))])
    .await?;

    let table = table_at(addr)?;
    let (keys, result) = collect_keys(&table, &RowSet::Prefix("MTA/M86-SBS".into())).await;

    assert!(keys.is_empty());
    match result {
        Err(Error::Status { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "table not found (NOT_FOUND)");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    server.await??;
    Ok(())
}

#[tokio::test]
async fn streams_rows_in_order() -> Result<()> {
    let body = json!([row(M86, "40.78", "-73.95"), row(M86_OTHER, "40.77", "-73.94")]);
    let (addr, server) = serve(vec![Step::Write(format!("{}{body}", response_head("200 OK")))]).await?;

    let table = table_at(addr)?;
    let filter = RowFilter::chain([RowFilter::column("VehicleLocation.*"), RowFilter::LatestN(1)]);
    let mut rows = Vec::new();
    table
        .read_rows(&RowSet::Prefix("MTA/M86-SBS".into()), Some(&filter), |row| {
            rows.push(row.clone());
            Ok(true)
        })
        .await?;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key(), M86);
    assert_eq!(rows[1].key(), M86_OTHER);
    let cells = rows[0].family("cf").expect("cf family");
    assert_eq!(cells[0].value_str(), "40.78");
    assert_eq!(cells[1].column, "cf:VehicleLocation.Longitude");

    let served = server.await??;
    assert!(
        served
            .head
            .starts_with("POST /v2/projects/my-project/instances/bus-instance/tables/bus-data:readRows "),
        "{}",
        served.head
    );
    assert!(served
        .head
        .lines()
        .any(|line| line.eq_ignore_ascii_case("authorization: Bearer test-token")));
    assert_eq!(
        served.body["rows"]["rowRanges"][0]["startKeyClosed"],
        json!(STANDARD.encode("MTA/M86-SBS"))
    );
    assert_eq!(
        served.body["filter"]["chain"]["filters"][1],
        json!({ "cellsPerColumnLimitFilter": 1 })
    );
    assert!(served.body.get("rowsLimit").is_none());
    Ok(())
}

#[tokio::test]
async fn error_after_rows_fails_the_read() -> Result<()> {
    let body = json!([
        row(M86, "40.78", "-73.95"),
        { "error": { "code": 503, "message": "backend unavailable" } },
    ]);
    let (addr, server) = serve(vec![Step::Write(format!("{}{body}", response_head("200 OK")))]).await?;

    let table = table_at(addr)?;
    let (keys, result) = collect_keys(&table, &RowSet::Prefix("MTA/M86-SBS".into())).await;

    assert_eq!(keys, vec![M86.to_string()]);
    let err = result.expect_err("a trailing error element must fail the read");
    assert_eq!(err.kind(), ErrorKind::Read);
    assert!(matches!(err, Error::Status { status: 503, .. }), "{err:?}");
    server.await??;
    Ok(())
}

#[tokio::test]
async fn lone_error_object_fails_the_read() -> Result<()> {
    let body = json!({ "error": { "code": 503, "message": "backend unavailable" } });
    let (addr, server) = serve(vec![Step::Write(format!("{}{body}", response_head("200 OK")))]).await?;

    let table = table_at(addr)?;
    let (keys, result) = collect_keys(&table, &RowSet::Prefix("MTA/M86-SBS".into())).await;

    assert!(keys.is_empty());
    assert!(matches!(result, Err(Error::Status { status: 503, .. })), "{result:?}");
    server.await??;
    Ok(())
}

#[tokio::test]
async fn caller_can_stop_early() -> Result<()> {
    let body = json!([row(M86, "40.78", "-73.95"), row(M86_OTHER, "40.77", "-73.94")]);
    let (addr, server) = serve(vec![Step::Write(format!("{}{body}", response_head("200 OK")))]).await?;

    let table = table_at(addr)?;
    let mut seen = Vec::new();
    table
        .read_rows(&RowSet::Prefix("MTA/M86-SBS".into()), None, |row| {
            seen.push(row.key().to_string());
            Ok(false)
        })
        .await?;

    assert_eq!(seen, vec![M86.to_string()]);
    server.await??;
    Ok(())
}

#[tokio::test]
async fn rows_arrive_before_the_body_ends() -> Result<()> {
    let (tx, rx) = oneshot::channel();
    let first = row(M86, "40.78", "-73.95");
    let second = row(M86_OTHER, "40.77", "-73.94");
    let (addr, server) = serve(vec![
        Step::Write(format!("{}[{first}", response_head("200 OK"))),
        Step::Await(rx),
        Step::Write(format!(",{second}]")),
    ])
    .await?;

    let table = table_at(addr)?;
    let mut tx = Some(tx);
    let mut keys = Vec::new();
    table
        .read_rows(&RowSet::Prefix("MTA/M86-SBS".into()), None, |row| {
            if let Some(tx) = tx.take() {
                tx.send(()).ok();
            }
            keys.push(row.key().to_string());
            Ok(true)
        })
        .await?;

    assert_eq!(keys, vec![M86.to_string(), M86_OTHER.to_string()]);
    let served = server.await??;
    assert_eq!(served.signalled, vec![true], "first row was held until the body ended");
    Ok(())
}

#[tokio::test]
async fn stalled_body_times_out() -> Result<()> {
    let first = row(M86, "40.78", "-73.95");
    let (addr, _server) = serve(vec![
        Step::Write(format!("{}[{first}", response_head("200 OK"))),
        Step::Stall(Duration::from_secs(10)),
    ])
    .await?;

    let mut config = ClientConfig::new(TableName::new("my-project", "bus-instance", "bus-data"));
    config.endpoint = format!("http://{addr}");
    config.timeout = Duration::from_millis(200);
    let table = RestTable::new(config)?;
    let (keys, result) = collect_keys(&table, &RowSet::Prefix("MTA/M86-SBS".into())).await;

    assert_eq!(keys, vec![M86.to_string()]);
    assert!(matches!(result, Err(Error::Timeout(_))), "{result:?}");
    Ok(())
}

#[tokio::test]
async fn point_lookup_asks_for_one_row() -> Result<()> {
    let body = json!([row(M86, "40.78", "-73.95")]);
    let (addr, server) = serve(vec![Step::Write(format!("{}{body}", response_head("200 OK")))]).await?;

    let table = table_at(addr)?;
    let found = table.read_row(M86, None).await?.expect("row");
    assert_eq!(found.key(), M86);

    let served = server.await??;
    assert_eq!(served.body["rowsLimit"], json!("1"));
    assert_eq!(served.body["rows"]["rowKeys"], json!([STANDARD.encode(M86)]));
    Ok(())
}
