//! # Prism Core
//!
//! Frame filter pipeline: a registry of CPU graph and GPU kernel filters,
//! reusable output buffer pools, an options resolver backed by a settings
//! store, and the dispatcher that ties them together per frame.

// ============================================================================
// Frames & Formats
// ============================================================================
pub mod format;
pub mod frame;
pub mod pool;

// ============================================================================
// Options & Configuration
// ============================================================================
pub mod options;
pub mod settings;
pub mod resolver;
pub mod config;

// ============================================================================
// Filters
// ============================================================================
pub mod filter;
pub mod graph;
pub mod catalog;
pub mod gpu;

// ============================================================================
// Pipeline
// ============================================================================
pub mod registry;
pub mod dispatcher;
pub mod error;

pub use catalog::{FilterCategory, FilterId};
pub use config::PipelineConfig;
pub use dispatcher::{FilterPipeline, Selection};
pub use error::{FilterError, GpuError, Result};
pub use filter::{Filter, FilterHandle, FilterState};
pub use format::{ColorSpace, FormatContext, PixelLayout};
pub use frame::{Frame, FrameCompletion};
pub use gpu::GpuContext;
pub use options::{FromOptions, OptionBag, OptionKey, OptionValue, Rgba};
pub use pool::{BufferPoolManager, FrameBufferPool, PoolStats};
pub use registry::FilterRegistry;
pub use resolver::OptionsResolver;
pub use settings::{MemorySettings, NoSettings, SettingsStore};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
