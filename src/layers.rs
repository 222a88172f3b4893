//! Visibility layers.
//!
//! Every drawable and every camera carries a [`Layers`] mask. A camera draws an
//! object only when both masks share at least one layer. This is how the cube
//! capture sees the rings but not the model that reflects them.

/// A set of up to 32 layers. New masks contain layer 0 only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layers(u32);

impl Layers {
    pub const fn only(layer: u32) -> Self {
        Self(1 << (layer & 31))
    }

    pub fn enable(&mut self, layer: u32) {
        self.0 |= 1 << (layer & 31);
    }

    /// Whether both masks share a layer.
    pub fn test(&self, other: &Layers) -> bool {
        self.0 & other.0 != 0
    }

    pub fn with(mut self, layer: u32) -> Self {
        self.enable(layer);
        self
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::only(0)
    }
}
