//! Geometry expressions

use super::Node;
use crate::app::models::LonLat;

/// A server-side geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry(Node);

impl Geometry {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(node)
    }

    /// Point geometry at a (longitude, latitude) pair
    pub fn point(lonlat: LonLat) -> Self {
        Self(
            Node::invoke("GeometryConstructors.Point")
                .arg(
                    "coordinates",
                    Node::constant(vec![lonlat.lon(), lonlat.lat()]),
                )
                .build(),
        )
    }

    /// Buffers the geometry by `distance` meters
    pub fn buffer(&self, distance: f64, max_error: f64) -> Self {
        Self(
            Node::invoke("Geometry.buffer")
                .arg("geometry", self.0.clone())
                .arg("distance", distance)
                .arg("maxError", max_error)
                .build(),
        )
    }

    /// Axis-aligned bounding box of the geometry
    pub fn bounds(&self, max_error: f64) -> Self {
        Self(
            Node::invoke("Geometry.bounds")
                .arg("geometry", self.0.clone())
                .arg("maxError", max_error)
                .build(),
        )
    }

    /// Square region centered on `lonlat` whose side is `side` meters
    pub fn square_around(lonlat: LonLat, side: f64, max_error: f64) -> Self {
        Self::point(lonlat)
            .buffer(side / 2.0, max_error)
            .bounds(max_error)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }
}

impl From<Geometry> for Node {
    fn from(geometry: Geometry) -> Self {
        geometry.0
    }
}

impl From<&Geometry> for Node {
    fn from(geometry: &Geometry) -> Self {
        geometry.0.clone()
    }
}
