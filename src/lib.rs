//! # StencilForge
//!
//! Generates 3D-printable solder-paste stencils from Gerber paste and outline
//! layers.
//!
//! ## Architecture
//!
//! StencilForge is organized as a workspace with multiple crates:
//!
//! 1. **stencilforge-core** - Errors, units, 2D primitives, trace objects
//! 2. **stencilforge-settings** - Configuration model, JSON/TOML loading, validation
//! 3. **stencilforge-geometry** - Gerber adapter, rasterizer, outline reconstruction, QFN regeneration, locators
//! 4. **stencilforge-mesh** - Extrusion, watertight rebuild, mesh repair, STL export
//! 5. **stencilforge** - Pipeline orchestration and the command-line binary
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stencilforge::{generate_stencil, CancelFlag, StencilConfig};
//!
//! let config = StencilConfig::default();
//! let trace = generate_stencil(
//!     Path::new("gerbers"),
//!     Path::new("out/stencil.stl"),
//!     &config,
//!     &CancelFlag::new(),
//! )?;
//! println!("{} faces", trace.stl_faces);
//! # Ok::<(), stencilforge::Error>(())
//! ```

pub mod files;
pub mod pipeline;

pub use files::{compile_glob, find_files};
pub use pipeline::{generate_stencil, outline_from_paste};

pub use stencilforge_core::{CancelFlag, Error, Result, StencilTrace};
pub use stencilforge_settings::StencilConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging on stderr with:
/// - `info` as the default level
/// - RUST_LOG environment variable support
/// - JSON lines when `STENCILFORGE_LOG_FORMAT=json`
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("STENCILFORGE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
