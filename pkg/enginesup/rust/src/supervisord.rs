// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Minimal supervisord XML-RPC client: just the three calls the supervisor
//! needs.

use crate::errors::ControlError;
use crate::ports::{ProcessInfo, ProcessManager};
use async_trait::async_trait;
use log::debug;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde_json::{Map, Number, Value};
use tokio::time::Duration;

pub struct SupervisordClient {
    http: reqwest::Client,
    url: String,
    credentials: Option<(String, String)>,
}

impl SupervisordClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.credentials = Some((username, password));
        self
    }

    async fn call(&self, method: &str, params: &[Param<'_>]) -> Result<Value, ControlError> {
        let body = encode_call(method, params);
        debug!("supervisord call {method}");

        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Transport(format!(
                "{method} answered HTTP {status}"
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        decode_response(&text)
    }
}

#[async_trait]
impl ProcessManager for SupervisordClient {
    async fn process_info(&self, name: &str) -> Result<ProcessInfo, ControlError> {
        let raw = self
            .call("supervisor.getProcessInfo", &[Param::Str(name)])
            .await?;
        let state_code = raw
            .get("state")
            .and_then(Value::as_i64)
            .ok_or_else(|| ControlError::Protocol("process info has no state".to_string()))?;
        Ok(ProcessInfo { state_code, raw })
    }

    async fn stop_process(&self, name: &str, wait: bool) -> Result<(), ControlError> {
        self.call("supervisor.stopProcess", &[Param::Str(name), Param::Bool(wait)])
            .await?;
        Ok(())
    }

    async fn start_process(&self, name: &str, wait: bool) -> Result<(), ControlError> {
        self.call("supervisor.startProcess", &[Param::Str(name), Param::Bool(wait)])
            .await?;
        Ok(())
    }
}

enum Param<'a> {
    Str(&'a str),
    Bool(bool),
}

fn encode_call(method: &str, params: &[Param<'_>]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\"?><methodCall><methodName>{}</methodName><params>",
        escape(method)
    );
    for param in params {
        let value = match param {
            Param::Str(s) => format!("<string>{}</string>", escape(*s)),
            Param::Bool(b) => format!("<boolean>{}</boolean>", u8::from(*b)),
        };
        xml.push_str(&format!("<param><value>{value}</value></param>"));
    }
    xml.push_str("</params></methodCall>");
    xml
}

/// Decode a `methodResponse` into JSON. A `<fault>` becomes
/// [`ControlError::Fault`].
fn decode_response(xml: &str) -> Result<Value, ControlError> {
    let mut reader = Reader::from_str(xml);

    loop {
        match next(&mut reader)? {
            Event::Start(e) if e.name().as_ref() == b"value" => {
                return parse_value(&mut reader);
            }
            Event::Start(e) if e.name().as_ref() == b"fault" => {
                expect_start(&mut reader, b"value")?;
                let fault = parse_value(&mut reader)?;
                return Err(ControlError::Fault {
                    code: fault.get("faultCode").and_then(Value::as_i64).unwrap_or(0),
                    message: fault
                        .get("faultString")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown fault")
                        .to_string(),
                });
            }
            Event::Eof => {
                return Err(ControlError::Protocol("empty methodResponse".to_string()));
            }
            _ => {}
        }
    }
}

fn next<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>, ControlError> {
    reader
        .read_event()
        .map_err(|e| ControlError::Protocol(format!("malformed XML: {e}")))
}

fn expect_start(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<(), ControlError> {
    loop {
        match next(reader)? {
            Event::Start(e) if e.name().as_ref() == tag => return Ok(()),
            Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => {}
            other => {
                return Err(ControlError::Protocol(format!(
                    "expected <{}>, got {other:?}",
                    String::from_utf8_lossy(tag)
                )));
            }
        }
    }
}

/// Collect character data up to the closing tag of the current element.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, ControlError> {
    let mut text = String::new();
    loop {
        match next(reader)? {
            Event::Text(t) => text.push_str(&String::from_utf8_lossy(&t)),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) => text.push_str(resolve_entity(&String::from_utf8_lossy(&r))),
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(ControlError::Protocol("unexpected end of XML".to_string())),
            _ => {}
        }
    }
}

fn resolve_entity(name: &str) -> &'static str {
    match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => "",
    }
}

/// Parse the inside of a `<value>` element, consuming its closing tag.
fn parse_value(reader: &mut Reader<&[u8]>) -> Result<Value, ControlError> {
    let mut untyped = String::new();
    let mut value = None;
    loop {
        match next(reader)? {
            Event::Start(e) => {
                let parsed = match e.name().as_ref() {
                    b"string" => Value::String(read_text(reader)?),
                    b"int" | b"i4" | b"i8" => {
                        let text = read_text(reader)?;
                        Value::Number(text.trim().parse::<i64>().map(Number::from).map_err(
                            |_| ControlError::Protocol(format!("invalid int: {text:?}")),
                        )?)
                    }
                    b"boolean" => Value::Bool(read_text(reader)?.trim() == "1"),
                    b"double" => {
                        let text = read_text(reader)?;
                        text.trim()
                            .parse::<f64>()
                            .ok()
                            .and_then(Number::from_f64)
                            .map(Value::Number)
                            .ok_or_else(|| {
                                ControlError::Protocol(format!("invalid double: {text:?}"))
                            })?
                    }
                    b"struct" => parse_struct(reader)?,
                    b"array" => parse_array(reader)?,
                    b"nil" => {
                        read_text(reader)?;
                        Value::Null
                    }
                    _ => Value::String(read_text(reader)?),
                };
                value = Some(parsed);
            }
            Event::Empty(e) => {
                value = Some(match e.name().as_ref() {
                    b"string" => Value::String(String::new()),
                    _ => Value::Null,
                });
            }
            Event::Text(t) => untyped.push_str(&String::from_utf8_lossy(&t)),
            Event::CData(t) => untyped.push_str(&String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) => {
                untyped.push_str(resolve_entity(&String::from_utf8_lossy(&r)))
            }
            Event::End(_) => return Ok(value.unwrap_or(Value::String(untyped))),
            Event::Eof => return Err(ControlError::Protocol("unexpected end of XML".to_string())),
            _ => {}
        }
    }
}

fn parse_struct(reader: &mut Reader<&[u8]>) -> Result<Value, ControlError> {
    let mut map = Map::new();
    loop {
        match next(reader)? {
            Event::Start(e) if e.name().as_ref() == b"member" => {
                let mut name = None;
                let mut value = Value::Null;
                loop {
                    match next(reader)? {
                        Event::Start(e) if e.name().as_ref() == b"name" => {
                            name = Some(read_text(reader)?);
                        }
                        Event::Start(e) if e.name().as_ref() == b"value" => {
                            value = parse_value(reader)?;
                        }
                        Event::End(_) => break,
                        Event::Eof => {
                            return Err(ControlError::Protocol("unterminated member".to_string()));
                        }
                        _ => {}
                    }
                }
                if let Some(name) = name {
                    map.insert(name, value);
                }
            }
            Event::End(_) => return Ok(Value::Object(map)),
            Event::Eof => return Err(ControlError::Protocol("unterminated struct".to_string())),
            _ => {}
        }
    }
}

fn parse_array(reader: &mut Reader<&[u8]>) -> Result<Value, ControlError> {
    let mut items = Vec::new();
    loop {
        match next(reader)? {
            Event::Start(e) if e.name().as_ref() == b"value" => items.push(parse_value(reader)?),
            // </data>
            Event::End(e) if e.name().as_ref() == b"data" => {}
            Event::End(_) => return Ok(Value::Array(items)),
            Event::Eof => return Err(ControlError::Protocol("unterminated array".to_string())),
            _ => {}
        }
    }
}
