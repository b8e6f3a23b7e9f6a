//! Tools served by the host.

pub mod calculator;
pub mod weather;

use crate::error::{Error, Result};
use mcp::{CallToolResult, Tool};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::info;
use weather::NwsClient;

#[derive(Debug, Deserialize)]
struct AlertsArgs {
    state: String,
}

#[derive(Debug, Deserialize)]
struct ForecastArgs {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct CalculateArgs {
    expression: String,
}

/// Dispatches `tools/call` to the tool implementations.
#[derive(Debug, Clone)]
pub struct Toolbox {
    nws: NwsClient,
}

impl Toolbox {
    pub fn new(nws: NwsClient) -> Self {
        Self { nws }
    }

    /// Definitions advertised by `tools/list`.
    pub fn definitions(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "get_alerts".into(),
                description: Some("Get weather alerts for a US state.".into()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "state": {
                            "type": "string",
                            "description": "Two-letter US state code (e.g. CA, NY)"
                        }
                    },
                    "required": ["state"]
                }),
            },
            Tool {
                name: "get_forecast".into(),
                description: Some("Get weather forecast for a location.".into()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "latitude": {"type": "number", "description": "Latitude of the location"},
                        "longitude": {"type": "number", "description": "Longitude of the location"}
                    },
                    "required": ["latitude", "longitude"]
                }),
            },
            Tool {
                name: "calculate_expression".into(),
                description: Some(
                    "Safely evaluate a simple math expression (e.g., \"2 + 2 * 3\").".into(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "A math expression in string format"
                        }
                    },
                    "required": ["expression"]
                }),
            },
        ]
    }

    /// Run a tool. Unknown tools come back as a flagged result; malformed
    /// arguments are a protocol error.
    pub async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        info!(tool = %name, "dispatching tool call");
        let text = match name {
            "get_alerts" => {
                let args: AlertsArgs = parse_args(name, arguments)?;
                self.nws.alerts(&args.state).await
            }
            "get_forecast" => {
                let args: ForecastArgs = parse_args(name, arguments)?;
                self.nws.forecast(args.latitude, args.longitude).await
            }
            "calculate_expression" => {
                let args: CalculateArgs = parse_args(name, arguments)?;
                calculator::calculate(&args.expression)
            }
            other => return Ok(CallToolResult::error(format!("Unknown tool: {other}"))),
        };
        Ok(CallToolResult::text(text))
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| Error::InvalidParams(format!("{tool}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolbox() -> Toolbox {
        Toolbox::new(NwsClient::new("http://127.0.0.1:9").unwrap())
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn definitions_have_object_schemas() {
        let tools = toolbox().definitions();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_alerts", "get_forecast", "calculate_expression"]);
        assert!(tools.iter().all(|t| t.input_schema["type"] == "object"));
    }

    #[tokio::test]
    async fn calculator_via_dispatch() {
        let result = toolbox()
            .call("calculate_expression", args(json!({"expression": "2 + 2 * 3"})))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.joined_text(), "8");
    }

    #[tokio::test]
    async fn unknown_tool_is_flagged() {
        let result = toolbox().call("launch_rockets", Map::new()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "Unknown tool: launch_rockets");
    }

    #[tokio::test]
    async fn missing_argument_is_invalid_params() {
        let err = toolbox().call("get_alerts", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(ref msg) if msg.contains("state")));
    }
}
