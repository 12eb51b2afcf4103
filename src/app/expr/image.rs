//! Image expressions

use serde_json::Value;

use super::{FeatureCollection, Geometry, Node};

/// A server-side raster, never materialized locally
#[derive(Debug, Clone, PartialEq)]
pub struct Image(Node);

impl Image {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(node)
    }

    /// Loads a stored image asset
    pub fn load(id: &str) -> Self {
        Self(Node::invoke("Image.load").arg("id", id).build())
    }

    /// Constant image with a single band
    pub fn constant(value: impl Into<Value>) -> Self {
        Self(
            Node::invoke("Image.constant")
                .arg("value", Node::constant(value))
                .build(),
        )
    }

    /// Selects bands by name or regular expression
    pub fn select(&self, selectors: &[&str]) -> Self {
        Self(
            Node::invoke("Image.select")
                .arg("input", self)
                .arg("bandSelectors", Node::constant(selectors.to_vec()))
                .build(),
        )
    }

    /// Renames the bands of the image in order
    pub fn rename(&self, names: &[&str]) -> Self {
        Self(
            Node::invoke("Image.rename")
                .arg("input", self)
                .arg("names", Node::constant(names.to_vec()))
                .build(),
        )
    }

    /// Per-pixel bitwise AND with a constant
    pub fn bitwise_and(&self, mask: i64) -> Self {
        Self(
            Node::invoke("Image.bitwiseAnd")
                .arg("image1", self)
                .arg("image2", Image::constant(mask))
                .build(),
        )
    }

    /// 1 where pixels equal `value`, 0 elsewhere
    pub fn equals(&self, value: impl Into<Value>) -> Self {
        Self(
            Node::invoke("Image.eq")
                .arg("image1", self)
                .arg("image2", Image::constant(value))
                .build(),
        )
    }

    /// Masks out pixels where `mask` is zero
    pub fn update_mask(&self, mask: &Image) -> Self {
        Self(
            Node::invoke("Image.updateMask")
                .arg("image", self)
                .arg("mask", mask)
                .build(),
        )
    }

    /// Maps pixel values `from[i]` to `to[i]`; others become `default` or get masked
    pub fn remap(&self, from: &[i64], to: &[i64], default: Option<i64>) -> Self {
        let mut invocation = Node::invoke("Image.remap")
            .arg("image", self)
            .arg("from", Node::constant(from.to_vec()))
            .arg("to", Node::constant(to.to_vec()));
        if let Some(default) = default {
            invocation = invocation.arg("defaultValue", default);
        }
        Self(invocation.build())
    }

    /// Replaces masked pixels with `value` and removes the mask
    pub fn unmask(&self, value: f64) -> Self {
        Self(
            Node::invoke("Image.unmask")
                .arg("input", self)
                .arg("value", value)
                .build(),
        )
    }

    /// Clips to the union of a feature collection's geometries
    pub fn clip_to_collection(&self, collection: &FeatureCollection) -> Self {
        Self(
            Node::invoke("Image.clipToCollection")
                .arg("input", self)
                .arg("collection", collection)
                .build(),
        )
    }

    /// Clips to a geometry
    pub fn clip(&self, geometry: &Geometry) -> Self {
        Self(
            Node::invoke("Image.clip")
                .arg("input", self)
                .arg("geometry", geometry)
                .build(),
        )
    }

    /// Clips to `geometry` and resamples to exactly `width` x `height` pixels
    pub fn clip_to_bounds_and_scale(&self, geometry: &Geometry, width: u32, height: u32) -> Self {
        Self(
            Node::invoke("Image.clipToBoundsAndScale")
                .arg("input", self)
                .arg("geometry", geometry)
                .arg("width", width)
                .arg("height", height)
                .build(),
        )
    }

    /// Casts every band to 32-bit float
    pub fn to_float(&self) -> Self {
        Self(Node::invoke("Image.toFloat").arg("value", self).build())
    }

    /// Casts every band to unsigned byte
    pub fn to_byte(&self) -> Self {
        Self(Node::invoke("Image.toByte").arg("value", self).build())
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// REST `Expression` for this image
    pub fn to_expression(&self) -> Value {
        self.0.to_expression()
    }
}

impl From<Image> for Node {
    fn from(image: Image) -> Self {
        image.0
    }
}

impl From<&Image> for Node {
    fn from(image: &Image) -> Self {
        image.0.clone()
    }
}
