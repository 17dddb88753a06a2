//! Row Source: turns the feed body into `RawRecord`s.
//!
//! The source owns the body and drops it on every exit path. It stops at the
//! first malformed row, so nothing after that line is ever emitted.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use pricefeed_products::RawRecord;

use super::error::{ErrorSlot, IngestError};
use super::stats::IngestCounters;
use crate::config::HeaderPolicy;

pub(crate) async fn run_source<R>(
    reader: R,
    header: HeaderPolicy,
    intake: async_channel::Sender<RawRecord>,
    slot: Arc<ErrorSlot>,
    counters: Arc<IngestCounters>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line = 0usize;
    let mut first_row = true;
    // A quoted field may span physical lines; rows are numbered by where they start.
    let mut pending = String::new();
    let mut pending_line = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = slot.token().cancelled() => {
                debug!(line, "row source cancelled while reading");
                return;
            }
            next = lines.next_line() => next,
        };
        line += 1;

        let text = match next {
            Ok(Some(text)) => text,
            Ok(None) if pending.is_empty() => break,
            Ok(None) => {
                slot.report(IngestError::parse(pending_line, "unterminated quoted field"));
                return;
            }
            Err(e) => {
                slot.report(IngestError::Read {
                    line,
                    reason: e.to_string(),
                });
                return;
            }
        };
        if pending.is_empty() {
            if text.trim().is_empty() {
                continue;
            }
            pending = text;
            pending_line = line;
        } else {
            pending.push('\n');
            pending.push_str(&text);
        }
        if ends_in_quotes(&pending) {
            continue;
        }
        let text = std::mem::take(&mut pending);
        let line = pending_line;

        let fields = match split_row(&text) {
            Ok(fields) => fields,
            Err(reason) => {
                slot.report(IngestError::parse(line, reason));
                return;
            }
        };
        if std::mem::take(&mut first_row) && header.skips(&fields) {
            debug!(line, "skipping header row");
            continue;
        }

        let record = match parse_record(fields, line) {
            Ok(record) => record,
            Err(e) => {
                slot.report(e);
                return;
            }
        };

        tokio::select! {
            biased;
            _ = slot.token().cancelled() => {
                debug!(line, "row source cancelled while handing off");
                return;
            }
            sent = intake.send(record) => {
                if sent.is_err() {
                    debug!(line, "classifier intake closed");
                    return;
                }
            }
        }
        counters.row_read();
    }

    debug!(lines = line.saturating_sub(1), "feed exhausted");
}

/// Whether `text` stops inside a quoted field. A quote opens a field only at
/// its start, and `""` inside a quoted field is an escaped quote.
fn ends_in_quotes(text: &str) -> bool {
    let mut quoted = false;
    let mut field_start = true;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.next_if_eq(&'"').is_none() {
                    quoted = false;
                }
            }
            '"' if field_start => quoted = true,
            ',' | '\n' if !quoted => {
                field_start = true;
                continue;
            }
            _ => {}
        }
        field_start = false;
    }
    quoted
}

/// Split one row as CSV, trimming every field.
fn split_row(text: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_string).collect()),
        Ok(false) => Ok(Vec::new()),
        Err(e) => Err(format!("invalid CSV: {e}")),
    }
}

fn parse_record(fields: Vec<String>, line: usize) -> Result<RawRecord, IngestError> {
    let [name, price]: [String; 2] = fields.try_into().map_err(|fields: Vec<String>| {
        IngestError::parse(
            line,
            format!("expected 2 fields (name,price), found {}", fields.len()),
        )
    })?;

    if name.is_empty() {
        return Err(IngestError::parse(line, "missing product name"));
    }
    let price = price
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .ok_or_else(|| IngestError::parse(line, format!("price '{price}' is not a finite number")))?;

    Ok(RawRecord { name, price, line })
}
