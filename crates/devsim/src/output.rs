use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use devsim_frame::{resource, Message};
use serde::Serialize;

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

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'a str,
    resource: &'a str,
    builtin: bool,
    headers: BTreeMap<&'a str, &'a str>,
    body_size: usize,
    body: String,
    timestamp: String,
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", render_json(msg));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "RESOURCE", "HEADERS", "SIZE", "BODY"])
                .add_row(vec![
                    msg.kind.as_str().to_string(),
                    msg.resource.clone(),
                    header_summary(msg),
                    msg.body.len().to_string(),
                    body_preview(msg.body.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} resource={} headers=[{}] size={} body={}",
                msg.kind.as_str(),
                msg.resource,
                header_summary(msg),
                msg.body.len(),
                body_preview(msg.body.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(msg.body.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn render_json(msg: &Message) -> String {
    let out = MessageOutput {
        kind: msg.kind.as_str(),
        resource: &msg.resource,
        builtin: resource::is_builtin(&msg.resource),
        headers: msg
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
        body_size: msg.body.len(),
        body: body_preview(msg.body.as_ref()),
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn header_summary(msg: &Message) -> String {
    let mut pairs: Vec<String> = msg.headers.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(",")
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
