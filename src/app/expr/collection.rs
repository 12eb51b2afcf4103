//! Image and feature collection expressions

use super::{ComputedValue, Filter, Geometry, Image, Node};

/// A server-side collection of images
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection(Node);

impl ImageCollection {
    /// Loads a catalog image collection
    pub fn load(id: &str) -> Self {
        Self(Node::invoke("ImageCollection.load").arg("id", id).build())
    }

    pub fn filter(&self, filter: &Filter) -> Self {
        Self(
            Node::invoke("Collection.filter")
                .arg("collection", self)
                .arg("filter", filter)
                .build(),
        )
    }

    /// Keeps images intersecting the union of `region`'s features
    pub fn filter_bounds(&self, region: &FeatureCollection) -> Self {
        self.filter(&Filter::bounds(&region.geometry()))
    }

    /// Applies `algorithm` to every image server-side
    pub fn map(&self, algorithm: impl FnOnce(Image) -> Image) -> Self {
        let function = Node::lambda(|argument| algorithm(Image::from_node(argument)).into());
        Self(
            Node::invoke("Collection.map")
                .arg("collection", self)
                .arg("baseAlgorithm", function)
                .build(),
        )
    }

    /// Selects bands on every image
    pub fn select(&self, selectors: &[&str]) -> Self {
        self.map(|image| image.select(selectors))
    }

    /// Per-pixel median across the collection
    pub fn median(&self) -> Image {
        Image::from_node(
            Node::invoke("reduce.median")
                .arg("collection", self)
                .build(),
        )
    }

    pub fn first(&self) -> Image {
        Image::from_node(
            Node::invoke("Collection.first")
                .arg("collection", self)
                .build(),
        )
    }

    /// Number of images, evaluated on request
    pub fn size(&self) -> ComputedValue {
        ComputedValue::new(
            Node::invoke("Collection.size")
                .arg("collection", self)
                .build(),
        )
    }

    pub fn node(&self) -> &Node {
        &self.0
    }
}

impl From<&ImageCollection> for Node {
    fn from(collection: &ImageCollection) -> Self {
        collection.0.clone()
    }
}

/// A server-side collection of vector features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection(Node);

impl FeatureCollection {
    /// Loads a catalog table
    pub fn load(table_id: &str) -> Self {
        Self(
            Node::invoke("Collection.loadTable")
                .arg("tableId", table_id)
                .build(),
        )
    }

    pub fn filter(&self, filter: &Filter) -> Self {
        Self(
            Node::invoke("Collection.filter")
                .arg("collection", self)
                .arg("filter", filter)
                .build(),
        )
    }

    /// Union of all feature geometries
    pub fn geometry(&self) -> Geometry {
        Geometry::from_node(
            Node::invoke("Collection.geometry")
                .arg("collection", self)
                .build(),
        )
    }

    pub fn node(&self) -> &Node {
        &self.0
    }
}

impl From<&FeatureCollection> for Node {
    fn from(collection: &FeatureCollection) -> Self {
        collection.0.clone()
    }
}
