//! # Execution Dispatcher
//!
//! The entry point frame sources call. Tracks which filter is selected,
//! keeps the current stream format, and drives each filter through its
//! lifecycle before running it.
//!
//! ```text
//! frames ─► effective id ─► lookup ─► geometry check ─► format
//!                                                         │
//!            result ◄── run ◄── (reset +) initialize ◄────┘
//!                        └──── one filter lock ────┘
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::{FilterCategory, FilterId};
use crate::config::PipelineConfig;
use crate::error::{FilterError, Result};
use crate::format::FormatContext;
use crate::frame::Frame;
use crate::registry::FilterRegistry;
use crate::resolver::OptionsResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    NoFilterSelected,
    FilterSelected(FilterId),
}

#[derive(Debug, Default)]
struct DispatcherState {
    selection: Selection,
    format: Option<FormatContext>,
    frames_processed: u64,
}

pub struct FilterPipeline {
    registry: Arc<FilterRegistry>,
    resolver: OptionsResolver,
    config: PipelineConfig,
    state: Mutex<DispatcherState>,
}

impl FilterPipeline {
    pub fn new(registry: Arc<FilterRegistry>, resolver: OptionsResolver, config: PipelineConfig) -> Self {
        Self {
            registry,
            resolver,
            config,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    /// Built-in catalog, no stored settings, CPU only.
    pub fn with_defaults() -> Self {
        let config = PipelineConfig::default();
        let registry = FilterRegistry::builtin(config.pool_manager(), None);
        Self::new(Arc::new(registry), OptionsResolver::default(), config)
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Records the selection; nothing is initialized until a frame arrives.
    pub fn select_filter(&self, id: FilterId) {
        debug!("Selected {}", id);
        self.state.lock().selection = Selection::FilterSelected(id);
    }

    pub fn clear_selection(&self) {
        self.state.lock().selection = Selection::NoFilterSelected;
    }

    pub fn selected(&self) -> Selection {
        self.state.lock().selection
    }

    /// Format of the most recent primary frame.
    pub fn current_format(&self) -> Option<FormatContext> {
        self.state.lock().format
    }

    pub fn frames_processed(&self) -> u64 {
        self.state.lock().frames_processed
    }

    pub fn list_categories(&self) -> Vec<(FilterCategory, Vec<FilterId>)> {
        self.registry.list_categories()
    }

    pub fn all_names_sorted(&self) -> Vec<&'static str> {
        self.registry.all_names_sorted()
    }

    pub fn run_frame(&self, frame: &Frame, override_id: Option<FilterId>) -> Result<Frame> {
        self.run_frames(std::slice::from_ref(frame), override_id)
    }

    /// Runs the override, else the selection, else passthrough.
    pub fn run_frames(&self, frames: &[Frame], override_id: Option<FilterId>) -> Result<Frame> {
        let primary = frames.first().ok_or(FilterError::NoInputFrames)?;
        let id = override_id.unwrap_or_else(|| match self.selected() {
            Selection::FilterSelected(id) => id,
            Selection::NoFilterSelected => FilterId::Passthrough,
        });

        if id == FilterId::Passthrough {
            return Ok(primary.clone());
        }

        let handle = self
            .registry
            .lookup(id)
            .ok_or(FilterError::UnknownFilter(id))?;

        let expected = primary.format();
        if let Some(odd) = frames[1..]
            .iter()
            .map(Frame::format)
            .find(|format| !format.same_geometry(&expected))
        {
            if self.config.lenient_inputs {
                warn!("{}: mismatched inputs ({} vs {}), passing first through", id, expected, odd);
                return Ok(primary.clone());
            }
            return Err(FilterError::HeterogeneousInputs {
                expected,
                found: odd,
            });
        }

        let format = self.track_format(expected);
        let options = self.resolver.options_for(id);
        let output = handle.execute(frames, &format, self.config.min_buffers, &options)?;

        self.state.lock().frames_processed += 1;
        Ok(output)
    }

    fn track_format(&self, format: FormatContext) -> FormatContext {
        let mut state = self.state.lock();
        if state.format != Some(format) {
            debug!("Stream format now {}", format);
            state.format = Some(format);
        }
        format
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("selection", &self.selected())
            .finish()
    }
}
