// Copyright 2025-2026 CEMAXECUTER LLC

//! JSON-lines command console.
//!
//! One JSON object per line on stdin, e.g.
//! `{"cmd":"set_frequency","value":145500000,"req_id":"7"}`. Each line gets a
//! one-line JSON response on stdout. Accepted requests are handed to the
//! pipeline thread, which owns the instance.

use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, TrySendError};
use serde_json::{json, Value};

use rx_demod::{Command, ControlCommand};

/// Requests dispatched from the console thread to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Command(Command),
    Control(ControlCommand),
    Status,
    Terminate,
}

/// Parse one console line. The error is the message sent back to the user.
pub fn parse_line(line: &str) -> Result<(Request, Option<String>), (String, Option<String>)> {
    let root: Value = serde_json::from_str(line).map_err(|e| (format!("invalid JSON: {}", e), None))?;
    let req_id = root.get("req_id").and_then(|r| match r {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let fail = |msg: &str| (msg.to_string(), req_id.clone());

    let cmd = root
        .get("cmd")
        .and_then(|c| c.as_str())
        .ok_or_else(|| fail("missing cmd"))?;
    let value = root.get("value");

    let request = match cmd {
        "set_frequency" => {
            let freq = value.and_then(|v| v.as_i64()).ok_or_else(|| fail("missing value"))?;
            Request::Command(Command::SetFrequency(freq))
        }
        "set_bandwidth" => {
            let bw = value
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| fail("value must be a bandwidth in Hz"))?;
            Request::Command(Command::SetBandwidth(bw))
        }
        "set_audio_rate" => {
            let rate = value
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| fail("value must be a sample rate in Hz"))?;
            Request::Command(Command::SetAudioRate(rate))
        }
        "squelch" => match value.and_then(|v| v.as_bool()) {
            Some(true) => Request::Control(ControlCommand::SquelchOn),
            Some(false) => Request::Control(ControlCommand::SquelchOff),
            None => return Err(fail("value must be true or false")),
        },
        "set_type" => {
            let name = value.and_then(|v| v.as_str()).ok_or_else(|| fail("missing value"))?;
            Request::Control(ControlCommand::SetType(name.to_string()))
        }
        "get_status" => Request::Status,
        "terminate" => Request::Terminate,
        _ => return Err(fail("unknown command")),
    };
    Ok((request, req_id))
}

pub fn response(req_id: Option<&str>, status: &str, message: &str) -> String {
    let mut resp = json!({
        "type": "response",
        "status": status,
        "message": message,
    });
    if let Some(id) = req_id {
        resp["req_id"] = json!(id);
    }
    resp.to_string()
}

fn reply(line: &str) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}

/// Emit an unsolicited event line (acknowledgments, rejections, status).
pub fn event(value: Value) {
    reply(&value.to_string());
}

/// Read stdin until EOF, forwarding requests to `tx`.
pub fn spawn(tx: Sender<Request>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("console".to_string()).spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let (request, req_id) = match parse_line(&line) {
                Ok(parsed) => parsed,
                Err((msg, req_id)) => {
                    reply(&response(req_id.as_deref(), "error", &msg));
                    continue;
                }
            };
            let terminate = request == Request::Terminate;
            match tx.try_send(request) {
                Ok(()) => reply(&response(req_id.as_deref(), "ok", "queued")),
                Err(TrySendError::Full(_)) => {
                    reply(&response(req_id.as_deref(), "error", "command queue full"))
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
            if terminate {
                break;
            }
        }
        log::debug!("console closed");
    })
}
