//! Downstream score notification
//!
//! After a run computes scores, the latest one is published once as
//! `date=<YYYY-MM-DD>\nvalue=<float>`. The transport is STOMP 1.0 over TCP:
//! CONNECT, wait for CONNECTED, SEND, DISCONNECT.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use trendscore_common::config::NotifyConfig;
use trendscore_common::time::format_day;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Broker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Broker protocol error: {0}")]
    Protocol(String),

    #[error("Broker did not answer within {0:?}")]
    Timeout(Duration),
}

/// Publishes one score to an external message channel
#[async_trait]
pub trait DownstreamNotifier: Send + Sync {
    async fn notify(&self, day: NaiveDate, value: f64) -> Result<(), NotifyError>;
}

/// Message body for a score
pub fn notification_body(day: NaiveDate, value: f64) -> String {
    format!("date={}\nvalue={:?}", format_day(day), value)
}

/// Encode a STOMP frame
fn frame(command: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut out = String::with_capacity(64 + body.len());
    out.push_str(command);
    out.push('\n');
    for (name, value) in headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(body);
    let mut bytes = out.into_bytes();
    bytes.push(0);
    bytes
}

/// STOMP 1.0 publisher
pub struct StompNotifier {
    address: String,
    destination: String,
    login: Option<String>,
    passcode: Option<String>,
    timeout: Duration,
}

impl StompNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            address: config.broker.trim_start_matches("tcp://").to_string(),
            destination: config.destination.clone(),
            login: config.login.clone(),
            passcode: config.passcode.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn publish(&self, body: &str) -> Result<(), NotifyError> {
        let stream = TcpStream::connect(&self.address).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut connect_headers: Vec<(&str, &str)> = Vec::new();
        if let Some(login) = &self.login {
            connect_headers.push(("login", login.as_str()));
        }
        if let Some(passcode) = &self.passcode {
            connect_headers.push(("passcode", passcode.as_str()));
        }
        write_half.write_all(&frame("CONNECT", &connect_headers, "")).await?;

        let mut reply = Vec::new();
        let read = reader.read_until(0, &mut reply).await?;
        if read == 0 {
            return Err(NotifyError::Protocol("connection closed before CONNECTED".to_string()));
        }
        let reply = String::from_utf8_lossy(&reply);
        let reply = reply.trim_start_matches(['\n', '\r']);
        if !reply.starts_with("CONNECTED") {
            let first_line = reply.lines().next().unwrap_or_default();
            return Err(NotifyError::Protocol(format!("expected CONNECTED, got {}", first_line)));
        }

        let length = body.len().to_string();
        write_half
            .write_all(&frame(
                "SEND",
                &[("destination", self.destination.as_str()), ("content-length", length.as_str())],
                body,
            ))
            .await?;
        write_half.write_all(&frame("DISCONNECT", &[], "")).await?;
        write_half.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl DownstreamNotifier for StompNotifier {
    async fn notify(&self, day: NaiveDate, value: f64) -> Result<(), NotifyError> {
        let body = notification_body(day, value);
        tokio::time::timeout(self.timeout, self.publish(&body))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))??;

        tracing::info!(destination = %self.destination, day = %day, value, "Latest score sent to message queue");
        Ok(())
    }
}
