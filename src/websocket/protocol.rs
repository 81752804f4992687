use serde::{Deserialize, Serialize};

use crate::data::PriceSample;
use crate::error::ServiceError;

/// Frames a client sends over the message socket.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open stream `id` on `route`; `data` is the route's argument.
    RequestStream { id: u64, route: String, data: String },
    Cancel { id: u64 },
}

/// Frames the server sends back, tagged with the stream they belong to.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Next { id: u64, data: PriceSample },
    Error { id: Option<u64>, message: String },
}

impl ServerFrame {
    pub fn error(id: Option<u64>, message: impl Into<String>) -> Self {
        ServerFrame::Error { id, message: message.into() }
    }

    pub fn to_json(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_stream() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"request_stream","id":7,"route":"stockPrices","data":"DEMO"}"#
        ).unwrap();

        assert_eq!(frame, ClientFrame::RequestStream {
            id: 7,
            route: "stockPrices".to_string(),
            data: "DEMO".to_string(),
        });
    }

    #[test]
    fn test_parse_cancel() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"cancel","id":3}"#).unwrap();
        assert_eq!(frame, ClientFrame::Cancel { id: 3 });
    }

    #[test]
    fn test_reject_unknown_frame_type() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"fire_and_forget","id":1}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("DEMO").is_err());
    }

    #[test]
    fn test_error_frame_json() {
        let json = ServerFrame::error(None, "bad frame").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert!(value["id"].is_null());
        assert_eq!(value["message"], "bad frame");
    }
}
