//! MCP server loop over a line-delimited byte stream (stdin/stdout in
//! production).

use crate::engine::EngineHandle;
use crate::protocol::{CallToolParams, Request, Response, RpcError, DEFAULT_PROTOCOL_VERSION};
use crate::tools::{self, ToolCall};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const SERVER_NAME: &str = "faceblurd";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serve requests until the reader reaches end of input.
///
/// Requests are handled one at a time, in arrival order. Each response is
/// written as a single JSON line.
pub async fn serve<R, W>(mut reader: R, mut writer: W, engine: EngineHandle) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(line, &engine).await,
            Err(err) => {
                tracing::warn!(error = %err, "message is not valid UTF-8");
                Some(Response::error(None, RpcError::parse_error()))
            }
        };
        if let Some(response) = response {
            let mut json = serde_json::to_vec(&response)?;
            json.push(b'\n');
            writer.write_all(&json).await?;
            writer.flush().await?;
        }
    }
    tracing::info!("input closed");
    Ok(())
}

/// Handle one raw message. Returns `None` for notifications.
pub async fn handle_line(line: &str, engine: &EngineHandle) -> Option<Response> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable message");
            return Some(Response::error(None, RpcError::parse_error()));
        }
    };
    let request: Request = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(error = %err, "message is not a request object");
            return Some(Response::error(None, RpcError::invalid_request()));
        }
    };

    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification");
        return None;
    }

    let id = request.id.clone();
    let response = match dispatch(request, engine).await {
        Ok(result) => Response::success(id, result),
        Err(error) => Response::error(id, error),
    };
    Some(response)
}

async fn dispatch(request: Request, engine: &EngineHandle) -> Result<Value, RpcError> {
    tracing::debug!(method = %request.method, id = ?request.id, "request");
    match request.method.as_str() {
        "initialize" => Ok(initialize_result(request.params.as_ref())),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools::definitions() })),
        "tools/call" => {
            let params: CallToolParams = request
                .params
                .ok_or_else(|| RpcError::invalid_params("missing params"))
                .and_then(|p| {
                    serde_json::from_value(p).map_err(|e| RpcError::invalid_params(e.to_string()))
                })?;
            let call = ToolCall::parse(&params.name, params.arguments)
                .map_err(|e| RpcError::invalid_params(e.to_string()))?;
            let result = tools::call(engine, call).await;
            serde_json::to_value(result).map_err(|e| RpcError::new(-32603, e.to_string()))
        }
        other => Err(RpcError::method_not_found(other)),
    }
}

fn initialize_result(params: Option<&Value>) -> Value {
    let protocol_version = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use faceblur_core::{DetectorError, FaceDetect, PixelBox};
    use image::RgbImage;
    use tempfile::TempDir;

    struct NoFaces;

    impl FaceDetect for NoFaces {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<PixelBox>, DetectorError> {
            Ok(vec![])
        }
    }

    fn engine() -> EngineHandle {
        spawn_engine(Box::new(NoFaces), 4).unwrap()
    }

    async fn roundtrip(input: &str) -> Vec<Value> {
        roundtrip_bytes(input.as_bytes()).await
    }

    async fn roundtrip_bytes(input: &[u8]) -> Vec<Value> {
        let mut output = Vec::new();
        serve(input, &mut output, engine()).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn call_text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{}}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
        );
        let responses = roundtrip(input).await;
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], SERVER_NAME);

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["create_thumbnail", "detect_faces", "blur"]);
        assert!(tools[2]["inputSchema"]["properties"]["xmin"].is_object());
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let input = "{not json\n{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"method\":\"resources/list\"}\n";
        let responses = roundtrip(input).await;
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], "a");
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_serving() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#);
        input.push(b'\n');

        let responses = roundtrip_bytes(&input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 7);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_non_request_json_is_invalid_request() {
        let input = "{\"id\":1}\n[1]\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let responses = roundtrip(input).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[1]["error"]["code"], -32600);
        assert_eq!(responses[2]["id"], 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let input = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"sharpen","arguments":{}}}"#;
        let responses = roundtrip(input).await;
        assert_eq!(responses[0]["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_blur_missing_file_is_tool_error() {
        let input = r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"blur","arguments":{"image_path":"missing.png","xmin":0,"ymin":0,"xmax":1,"ymax":1}}}"#;
        let responses = roundtrip(input).await;
        assert!(responses[0].get("error").is_none());
        assert_eq!(responses[0]["result"]["isError"], true);
        assert_eq!(call_text(&responses[0]), "Error: Image file not found (missing.png)");
    }

    #[tokio::test]
    async fn test_tool_calls_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("sample_image.png");
        RgbImage::from_pixel(300, 150, image::Rgb([120, 80, 40])).save(&source).unwrap();
        let source = source.to_str().unwrap();

        let input = [
            json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"detect_faces","arguments":{"image_path":source}}}),
            json!({"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"blur","arguments":{"image_path":source,"xmin":0.0,"ymin":0.0,"xmax":0.5,"ymax":1.0}}}),
            json!({"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"create_thumbnail","arguments":{"image_path":source}}}),
        ]
        .iter()
        .map(|v| format!("{v}\n"))
        .collect::<String>();

        let responses = roundtrip(&input).await;
        assert_eq!(call_text(&responses[0]), "No faces detected.");

        let blurred = dir.path().join("sample_image_blur.png");
        assert_eq!(call_text(&responses[1]), format!("Blurred image saved to {}", blurred.display()));
        assert!(blurred.exists());

        let thumbnail = dir.path().join("sample_image_thumbnail.png");
        assert_eq!(call_text(&responses[2]), format!("Thumbnail saved to {}", thumbnail.display()));
        assert_eq!(image::image_dimensions(&thumbnail).unwrap(), (100, 50));
    }
}
