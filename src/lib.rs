//! Detection-zone editor for the video-analytics dashboard.
//!
//! Operators draw polygonal regions over a camera frame, name and type them,
//! tune their sensitivity, and persist them per camera. This crate is compiled
//! to WebAssembly and owns the canvas: it converts pointer and keyboard input
//! into drawing and selection changes, renders the frame and its regions, and
//! emits [`engine::Action`]s that the host turns into REST calls, toasts and
//! downloads.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Top-level engine and testable [`engine::EngineCore`] |
//! | [`repository`] | Per-camera region set, in-flight tracking and batches |
//! | [`drawing`] | Drawing and edit state machine |
//! | [`region`] | Region model, types and presets, form validation |
//! | [`geometry`] | Points, shapes, hit-testing and centroids |
//! | [`viewport`] | Zoom and client/logical coordinate conversion |
//! | [`gateway`] | Persistence trait, split-phase requests, in-memory backend |
//! | [`http`] | REST gateway and browser logging (`browser` feature) |
//! | [`render`] | Scene rendering onto a [`render::Surface`] |
//! | [`canvas_handle`] | `Canvas2D` implementation of [`render::Surface`] |
//! | [`observer`] | Change notifications for host views |
//! | [`input`] | Buttons, keys, modifiers and operator notices |
//! | [`config`] | Editor settings from `REGION_EDITOR_*` keys |
//! | [`config_io`] | JSON export and import of a camera's regions |
//! | [`consts`] | Shared numeric constants (zoom limits, minimum sizes, etc.) |

pub mod canvas_handle;
pub mod config;
pub mod config_io;
pub mod consts;
pub mod drawing;
pub mod engine;
pub mod gateway;
pub mod geometry;
pub mod http;
pub mod input;
pub mod observer;
pub mod region;
pub mod render;
pub mod repository;
pub mod viewport;
