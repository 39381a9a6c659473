//! Damage tracking for the three display layers
//!
//! Each layer carries its own dirty flag so a redraw can skip layers that did
//! not change since the previous pass. The rect layer additionally records
//! whether the whole surface must be cleared to the background color before
//! queued rects are painted.
//!
//! Flags are consumed by the redraw pass one layer at a time, right after that
//! layer is drawn. A mutation that lands after a layer was consumed therefore
//! stays pending for the next frame.
//!
//! # Example
//!
//! ```
//! use trackscreen::renderer::damage::{Layer, LayerDamage};
//!
//! let mut damage = LayerDamage::new();
//! damage.mark(Layer::Text);
//! assert!(damage.has_any_damage());
//!
//! assert!(damage.take(Layer::Text));
//! assert!(!damage.has_any_damage());
//! ```

/// One of the stacked display layers, listed in drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Background color and solid rects
    Rects,
    /// Character grid
    Text,
    /// Oscilloscope line
    Wave,
}

impl Layer {
    /// Compositing order, bottom to top.
    pub const ORDER: [Layer; 3] = [Layer::Rects, Layer::Text, Layer::Wave];
}

/// Per-layer dirty state for the next redraw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerDamage {
    rects: bool,
    text: bool,
    wave: bool,
    full_clear: bool,
}

impl LayerDamage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a layer as changed.
    pub fn mark(&mut self, layer: Layer) {
        match layer {
            Layer::Rects => self.rects = true,
            Layer::Text => self.text = true,
            Layer::Wave => self.wave = true,
        }
    }

    /// Requests a clear of the rect surface to the background color.
    ///
    /// Implies rect damage.
    pub fn mark_full_clear(&mut self) {
        self.full_clear = true;
        self.rects = true;
    }

    /// Marks every layer, including a full clear.
    pub fn mark_all(&mut self) {
        self.mark_full_clear();
        self.text = true;
        self.wave = true;
    }

    pub fn is_dirty(&self, layer: Layer) -> bool {
        match layer {
            Layer::Rects => self.rects,
            Layer::Text => self.text,
            Layer::Wave => self.wave,
        }
    }

    pub fn needs_full_clear(&self) -> bool {
        self.full_clear
    }

    pub fn has_any_damage(&self) -> bool {
        self.rects || self.text || self.wave
    }

    /// Returns and resets a layer's dirty flag.
    ///
    /// Taking the rect layer also resets the full-clear request.
    pub fn take(&mut self, layer: Layer) -> bool {
        let flag = match layer {
            Layer::Rects => {
                self.full_clear = false;
                &mut self.rects
            }
            Layer::Text => &mut self.text,
            Layer::Wave => &mut self.wave,
        };
        std::mem::take(flag)
    }

    /// Returns and resets the full-clear request, leaving rect damage alone.
    pub fn take_full_clear(&mut self) -> bool {
        std::mem::take(&mut self.full_clear)
    }
}
