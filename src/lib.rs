//! Nozzle Scope - manual nozzle-centering camera viewer
//!
//! Captures a USB camera feed, applies operator-selected view transforms
//! (mirroring, 90-degree rotation, axis swap, digital zoom), burns a
//! centered reticle into each frame, and shows the result in a window with
//! egui controls. The print head is moved with separate machine-control
//! software; this tool only provides the visual reference.

pub mod app;
pub mod camera;
pub mod view;

pub use app::App;
