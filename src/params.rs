//! Configuration for composite-grid setup.

use crate::algs::communicator::{CommTag, SetupCommTags};
use crate::amgdd_error::AmgDdError;

/// Parameters controlling how far each composite grid extends.
///
/// `padding` is the graph distance of the "real" halo, `num_ghost_layers` the
/// extra stencil-closure halo beyond it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompGridParams {
    pub padding: usize,
    pub num_ghost_layers: usize,
    /// Insert barriers between setup phases (timing runs).
    pub use_barriers: bool,
    /// Run the structural and data-fidelity checks before returning.
    pub self_check: bool,
    /// Base of the tag block used by every setup exchange.
    pub base_tag: u16,
}

impl Default for CompGridParams {
    fn default() -> Self {
        Self {
            padding: 1,
            num_ghost_layers: 1,
            use_barriers: false,
            self_check: false,
            base_tag: 0xADD0,
        }
    }
}

impl CompGridParams {
    pub fn new(padding: usize, num_ghost_layers: usize) -> Self {
        Self {
            padding,
            num_ghost_layers,
            ..Self::default()
        }
    }

    pub fn with_barriers(mut self, on: bool) -> Self {
        self.use_barriers = on;
        self
    }

    pub fn with_self_check(mut self, on: bool) -> Self {
        self.self_check = on;
        self
    }

    pub fn with_base_tag(mut self, tag: u16) -> Self {
        self.base_tag = tag;
        self
    }

    /// Total halo radius searched by neighbor discovery.
    pub fn reach(&self) -> usize {
        self.padding + self.num_ghost_layers
    }

    pub fn tags(&self) -> SetupCommTags {
        SetupCommTags::from_base(CommTag::new(self.base_tag))
    }

    pub fn validate(&self) -> Result<(), AmgDdError> {
        if self.padding == 0 {
            return Err(AmgDdError::InvalidParams(
                "padding must be at least 1".into(),
            ));
        }
        if self.base_tag.checked_add(SetupCommTags::SPAN).is_none() {
            return Err(AmgDdError::InvalidParams(format!(
                "base tag {:#x} leaves no room for {} setup tags",
                self.base_tag,
                SetupCommTags::SPAN
            )));
        }
        Ok(())
    }
}
