//! StencilForge Settings Crate
//!
//! Handles the stencil configuration model, JSON/TOML loading and validation.

pub mod config;
pub mod error;

pub use config::{
    CloseStrategy, FillRule, LocatorMode, LocatorSettings, MeshSettings, ModelBackend, OpenSide,
    OutlineSettings, OutputMode, QfnSettings, QualityMode, StencilConfig, StlFormat, StlSettings,
};
pub use error::{SettingsError, SettingsResult};
