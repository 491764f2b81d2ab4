//! Wire types for the line-delimited JSON protocol spoken with miners.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: &crate::error::StratumError) -> Self {
        Self {
            id,
            jsonrpc: "2.0",
            result: None,
            error: Some(ErrorBody {
                code: error.code,
                message: error.message.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// A `"job"` push notification sent unsolicited to a session.
#[derive(Debug, Serialize)]
pub struct JobPush {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: JobReplyData,
}

impl JobPush {
    pub fn new(params: JobReplyData) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "job",
            params,
        }
    }
}

/// The job payload returned by `login`, `getjob`, and pushed as a `"job"`
/// notification. All fields are empty/defaulted when a session already has
/// the current height's job (see `Session::get_job`).
#[derive(Debug, Default, Serialize)]
pub struct JobReplyData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub login: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub agent: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub id: String,
    pub status: &'static str,
    pub job: JobReplyData,
}

#[derive(Debug, Deserialize)]
pub struct GetJobParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    pub id: String,
    pub job_id: String,
    pub nonce: String,
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub status: &'static str,
}

impl StatusResult {
    pub fn ok() -> Value {
        serde_json::to_value(Self { status: "OK" }).unwrap()
    }

    pub fn keepalived() -> Value {
        serde_json::to_value(Self {
            status: "KEEPALIVED",
        })
        .unwrap()
    }
}
