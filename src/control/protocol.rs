//! Request parsing and response envelope for the control channel (spec.md
//! §4.6): bare-word-or-JSON requests in, always-JSON responses out.

use crate::controller::Selection;
use crate::error::RecorderError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed control-channel request, independent of whether it arrived as
/// a bare word or a JSON object.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Status,
    Streams,
    Update,
    Select(Selection),
    Start,
    Stop,
    Filename(String),
    GetFilename,
}

#[derive(Deserialize)]
struct JsonRequest {
    command: String,
    #[serde(default)]
    args: Value,
}

/// Parse one line (already stripped of its trailing `\n`).
pub fn parse_line(line: &str) -> Result<Request, RecorderError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(RecorderError::BadRequest("empty request".into()));
    }
    if line.starts_with('{') {
        let parsed: JsonRequest = serde_json::from_str(line)
            .map_err(|e| RecorderError::BadRequest(format!("invalid JSON request: {e}")))?;
        build_request(&parsed.command, ArgSource::Json(parsed.args))
    } else {
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        build_request(command, ArgSource::BareWord(rest.trim().to_string()))
    }
}

enum ArgSource {
    BareWord(String),
    Json(Value),
}

fn build_request(command: &str, args: ArgSource) -> Result<Request, RecorderError> {
    match command {
        "status" => Ok(Request::Status),
        "streams" => Ok(Request::Streams),
        "update" => Ok(Request::Update),
        "start" => Ok(Request::Start),
        "stop" => Ok(Request::Stop),
        "get_filename" => Ok(Request::GetFilename),
        "select" => Ok(Request::Select(parse_selection(args)?)),
        "filename" => Ok(Request::Filename(parse_filename_arg(args)?)),
        other => Err(RecorderError::BadRequest(format!("unknown command {other}"))),
    }
}

fn parse_selection(args: ArgSource) -> Result<Selection, RecorderError> {
    let words: Vec<String> = match args {
        ArgSource::BareWord(s) => s.split_whitespace().map(String::from).collect(),
        ArgSource::Json(Value::String(s)) => s.split_whitespace().map(String::from).collect(),
        ArgSource::Json(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| RecorderError::BadRequest("select args must be strings".into()))
            })
            .collect::<Result<_, _>>()?,
        ArgSource::Json(other) => {
            return Err(RecorderError::BadRequest(format!(
                "select args must be a string or array of strings, got {other}"
            )))
        }
    };
    match words.as_slice() {
        [] => Err(RecorderError::BadRequest("select requires all, none, or uids".into())),
        [only] if only == "all" => Ok(Selection::All),
        [only] if only == "none" => Ok(Selection::None),
        uids => Ok(Selection::Uids(uids.to_vec())),
    }
}

fn parse_filename_arg(args: ArgSource) -> Result<String, RecorderError> {
    match args {
        ArgSource::BareWord(s) if !s.is_empty() => Ok(s),
        ArgSource::Json(Value::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(RecorderError::BadRequest("filename requires a path or template".into())),
    }
}

/// The `{ok, result?, error?}\n` response envelope.
#[derive(Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl Response {
    pub fn ok(result: impl Serialize) -> Self {
        Self {
            ok: true,
            result: Some(serde_json::to_value(result).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn err(error: &RecorderError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    /// Render as a single line, newline-terminated.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"error":{"kind":"IOError","message":"failed to serialize response"}}"#
                .to_string()
        });
        line.push('\n');
        line
    }
}
