/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-machine host actors driving sessions over the channel.
pub mod host_service;
/// Operator actions on hosts (start, stop, mode, payment).
pub mod kiosk_service;
/// Machine profile CRUD.
pub mod machine_service;
/// Render stream event builders.
pub mod sse_events;
/// Render stream subscription and SSE plumbing.
pub mod sse_service;
/// Record store connection supervisor.
pub mod storage_supervisor;
/// WebSocket bridge between browsers and machine topics.
pub mod websocket_service;
