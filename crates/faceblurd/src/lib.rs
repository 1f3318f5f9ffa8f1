//! faceblurd: serves the faceblur image operations as MCP tools.
//!
//! A dedicated engine thread owns the face detector and runs the image
//! work; the async server loop parses JSON-RPC requests from stdin, hands
//! tool calls to the engine and writes the rendered results to stdout.

pub mod config;
pub mod engine;
pub mod protocol;
pub mod server;
pub mod tools;
