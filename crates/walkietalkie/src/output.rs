use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use walkietalkie_link::ChunkSource;

const PREVIEW_LIMIT: usize = 256;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Everything printed about one received message.
#[derive(Debug)]
pub struct MessageRecord {
    pub conn: String,
    pub peer: String,
    pub declared: Option<u64>,
    pub received: u64,
    pub chunks: Option<usize>,
    pub complete: bool,
    pub payload: Bytes,
}

impl MessageRecord {
    /// Drain `source` into a record. Truncated messages are kept, flagged
    /// incomplete.
    pub fn collect(conn: String, peer: String, mut source: ChunkSource) -> Self {
        let mut payload = BytesMut::new();
        let mut chunks = 0usize;
        while let Some(chunk) = source.next_chunk() {
            chunks += 1;
            payload.extend_from_slice(&chunk);
        }
        Self {
            conn,
            peer,
            declared: source.message_len(),
            received: source.received(),
            chunks: Some(chunks),
            complete: source.is_complete(),
            payload: payload.freeze(),
        }
    }

    /// Record for a framed reply read back by `send --wait`.
    pub fn reply(peer: String, payload: Bytes) -> Self {
        let len = payload.len() as u64;
        Self {
            conn: "reply".to_string(),
            peer,
            declared: Some(len),
            received: len,
            chunks: None,
            complete: true,
            payload,
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    conn: &'a str,
    peer: &'a str,
    declared: Option<u64>,
    received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
    complete: bool,
    payload: String,
    timestamp: String,
}

pub fn print_message(record: &MessageRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                conn: &record.conn,
                peer: &record.peer,
                declared: record.declared,
                received: record.received,
                chunks: record.chunks,
                complete: record.complete,
                payload: payload_preview(record.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONN", "PEER", "SIZE", "COMPLETE", "PAYLOAD"])
                .add_row(vec![
                    record.conn.clone(),
                    record.peer.clone(),
                    size_label(record),
                    record.complete.to_string(),
                    payload_preview(record.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "conn={} peer={} size={} complete={} payload={}",
                record.conn,
                record.peer,
                size_label(record),
                record.complete,
                payload_preview(record.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(record.payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn size_label(record: &MessageRecord) -> String {
    match record.declared {
        Some(declared) if declared == record.received => declared.to_string(),
        Some(declared) => format!("{}/{}", record.received, declared),
        None => "-".to_string(),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().count() > PREVIEW_LIMIT => {
            let cut: String = text.chars().take(PREVIEW_LIMIT).collect();
            format!("{cut}... ({} bytes)", payload.len())
        }
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
