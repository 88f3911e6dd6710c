//! Response model and JSON line encoding.
//!
//! Every response is one JSON object followed by `\n`, in one of three shapes:
//! - metrics: `{"ok":..,"status_code":..,"platform":..,...,"throttle_ms":..}`
//! - acknowledgement: `{"ok":true,"message":"..."}`
//! - error: `{"ok":false,"error":"..."}`

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::{Error, MetricSnapshot, Result, StatusCode, PLATFORM_NAME, TEMPERATURE_BEST_EFFORT};

/// Upper bound of one encoded response line, newline included.
pub const MAX_RESPONSE_BYTES: usize = 512;

/// Acknowledgement and error texts sent to clients.
pub mod messages {
    pub const PONG: &str = "pong";
    pub const RESTART_REQUESTED: &str = "restart requested";
    pub const THROTTLE_SET: &str = "throttle set";
    pub const UNKNOWN_COMMAND: &str = "unknown command";
    pub const REQUEST_TOO_LARGE: &str = "request too large";
}

/// Metrics payload answering `GET`.
///
/// `ok` and `status_code` describe the aggregate collection outcome, not the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub ok: bool,
    pub status_code: StatusCode,
    pub platform: String,
    pub temperature_best_effort: bool,
    pub ts_ms: u64,
    #[serde(serialize_with = "two_decimals")]
    pub cpu_usage_pct: f64,
    pub mem_total_kb: u64,
    pub mem_available_kb: u64,
    #[serde(serialize_with = "two_decimals")]
    pub temperature_c: f64,
    pub uptime_s: u64,
    pub throttle_ms: u32,
}

impl MetricsResponse {
    /// Builds the payload for a snapshot, its collection outcome and the live throttle.
    pub fn new(snapshot: &MetricSnapshot, outcome: &Result<()>, throttle_ms: u32) -> Self {
        Self {
            ok: outcome.is_ok(),
            status_code: StatusCode::from_outcome(outcome),
            platform: PLATFORM_NAME.to_string(),
            temperature_best_effort: TEMPERATURE_BEST_EFFORT,
            ts_ms: snapshot.ts_ms,
            cpu_usage_pct: snapshot.cpu_usage_pct,
            mem_total_kb: snapshot.mem_total_kb,
            mem_available_kb: snapshot.mem_available_kb,
            temperature_c: snapshot.temperature_c,
            uptime_s: snapshot.uptime_s,
            throttle_ms,
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Metrics(MetricsResponse),
    Ack { ok: bool, message: String },
    Error { ok: bool, error: String },
}

impl Response {
    /// Creates a successful acknowledgement.
    pub fn ack(message: impl Into<String>) -> Self {
        Response::Ack {
            ok: true,
            message: message.into(),
        }
    }

    /// Creates an error response.
    pub fn error(error: impl Into<String>) -> Self {
        Response::Error {
            ok: false,
            error: error.into(),
        }
    }

    /// Returns the `ok` field of the response.
    pub fn is_ok(&self) -> bool {
        match self {
            Response::Metrics(m) => m.ok,
            Response::Ack { ok, .. } | Response::Error { ok, .. } => *ok,
        }
    }

    /// Encodes the response as a `\n`-terminated JSON line.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(|e| Error::Internal(e.to_string()))?;
        line.push(b'\n');
        if line.len() > MAX_RESPONSE_BYTES {
            return Err(Error::Internal("response too large".to_string()));
        }
        Ok(line)
    }

    /// Decodes one response line, with or without its trailing newline.
    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end_matches(['\r', '\n']))
    }
}

/// Writes a float with exactly two decimals, e.g. `12.00`.
///
/// Non-finite values are written as `0.00` to keep the line valid JSON.
fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let value = if value.is_finite() { *value } else { 0.0 };
    RawValue::from_string(format!("{:.2}", value))
        .map_err(S::Error::custom)?
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(resp: &Response) -> String {
        String::from_utf8(resp.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_ack_and_error_shapes() {
        assert_eq!(line(&Response::ack(messages::PONG)), "{\"ok\":true,\"message\":\"pong\"}\n");
        assert_eq!(
            line(&Response::error(messages::UNKNOWN_COMMAND)),
            "{\"ok\":false,\"error\":\"unknown command\"}\n"
        );
    }

    #[test]
    fn test_metrics_field_order() {
        let snap = MetricSnapshot {
            ts_ms: 1_700_000_000_123,
            cpu_usage_pct: 12.0,
            mem_total_kb: 2048,
            mem_available_kb: 1024,
            temperature_c: 41.5,
            uptime_s: 99,
        };
        let resp = Response::Metrics(MetricsResponse::new(&snap, &Ok(()), 250));
        let expected = format!(
            "{{\"ok\":true,\"status_code\":0,\"platform\":\"{}\",\"temperature_best_effort\":{},\
             \"ts_ms\":1700000000123,\"cpu_usage_pct\":12.00,\"mem_total_kb\":2048,\
             \"mem_available_kb\":1024,\"temperature_c\":41.50,\"uptime_s\":99,\"throttle_ms\":250}}\n",
            PLATFORM_NAME, TEMPERATURE_BEST_EFFORT
        );
        assert_eq!(line(&resp), expected);
    }

    #[test]
    fn test_floats_have_two_decimals() {
        let mut snap = MetricSnapshot::at(1);
        for (value, expected) in [
            (0.0, "0.00"),
            (12.3456, "12.35"),
            (99.999, "100.00"),
            (-3.5, "-3.50"),
            (f64::NAN, "0.00"),
        ] {
            snap.cpu_usage_pct = value;
            snap.temperature_c = value;
            let encoded = line(&Response::Metrics(MetricsResponse::new(&snap, &Ok(()), 0)));
            assert!(
                encoded.contains(&format!("\"cpu_usage_pct\":{},", expected)),
                "{encoded}"
            );
            assert!(
                encoded.contains(&format!("\"temperature_c\":{},", expected)),
                "{encoded}"
            );
        }
    }

    #[test]
    fn test_metrics_reflect_outcome() {
        let outcome = Err(Error::Io("parse /proc/stat failed".into()));
        let m = MetricsResponse::new(&MetricSnapshot::default(), &outcome, 0);
        assert!(!m.ok);
        assert_eq!(m.status_code, StatusCode::IoError);
    }

    #[test]
    fn test_decode_shapes() {
        assert_eq!(
            Response::decode("{\"ok\":true,\"message\":\"throttle set\"}\n").unwrap(),
            Response::ack(messages::THROTTLE_SET)
        );
        assert_eq!(
            Response::decode("{\"ok\":false,\"error\":\"ms too large\"}").unwrap(),
            Response::error("ms too large")
        );

        let m = MetricsResponse::new(&MetricSnapshot::at(5), &Ok(()), 100);
        let encoded = line(&Response::Metrics(m.clone()));
        assert_eq!(Response::decode(&encoded).unwrap(), Response::Metrics(m));
    }

    #[test]
    fn test_oversized_is_internal() {
        let resp = Response::error("x".repeat(MAX_RESPONSE_BYTES));
        let err = resp.encode().unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
    }
}
