// Workflow and service boundary
pub mod analysis;
pub mod api;
pub mod capture;
pub mod config;
pub mod countdown;
pub mod display;
pub mod error;
pub mod media;
pub mod session;
pub mod workflow;

// Scene engines
pub mod ambient;
pub mod camera;
pub mod engine;
pub mod geometry;
pub mod gpu;
pub mod lighting;
pub mod material;
pub mod mesh_asset;
pub mod orbit;
pub mod point_field;
pub mod scene_graph;
pub mod viewer;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
