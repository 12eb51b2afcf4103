//! Collection filter expressions

use serde_json::Value;

use super::{Geometry, Node};

/// Calendar unit understood by `Filter.calendarRange`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Year,
    Month,
}

impl CalendarField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarField::Year => "year",
            CalendarField::Month => "month",
        }
    }
}

/// A server-side filter applied with `Collection.filter`
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(Node);

impl Filter {
    /// Keeps elements whose property `field` equals `value`
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Self(
            Node::invoke("Filter.equals")
                .arg("leftField", field)
                .arg("rightValue", Node::constant(value))
                .build(),
        )
    }

    /// Keeps elements whose property `field` is below `value`
    pub fn less_than(field: &str, value: impl Into<Value>) -> Self {
        Self(
            Node::invoke("Filter.lessThan")
                .arg("leftField", field)
                .arg("rightValue", Node::constant(value))
                .build(),
        )
    }

    /// Keeps images whose acquisition time falls within `[start, end]` of `field`
    pub fn calendar_range(start: u32, end: u32, field: CalendarField) -> Self {
        Self(
            Node::invoke("Filter.calendarRange")
                .arg("start", start)
                .arg("end", end)
                .arg("field", field.as_str())
                .build(),
        )
    }

    /// Keeps elements whose footprint intersects `geometry`
    pub fn bounds(geometry: &Geometry) -> Self {
        Self(
            Node::invoke("Filter.intersects")
                .arg("leftField", ".all")
                .arg("rightValue", geometry)
                .build(),
        )
    }

    pub fn node(&self) -> &Node {
        &self.0
    }
}

impl From<&Filter> for Node {
    fn from(filter: &Filter) -> Self {
        filter.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_range_arguments() {
        let filter = Filter::calendar_range(6, 7, CalendarField::Month);
        let node = filter.node();

        assert_eq!(node.function_name(), Some("Filter.calendarRange"));
        assert_eq!(node.argument("start"), Some(&Node::constant(6)));
        assert_eq!(node.argument("end"), Some(&Node::constant(7)));
        assert_eq!(node.argument("field"), Some(&Node::constant("month")));
    }

    #[test]
    fn test_property_filters() {
        let by_name = Filter::equals("NAME", "Alameda");
        assert_eq!(by_name.node().function_name(), Some("Filter.equals"));
        assert_eq!(
            by_name.node().argument("rightValue"),
            Some(&Node::constant("Alameda"))
        );

        let cloudy = Filter::less_than("CLOUDY_PIXEL_PERCENTAGE", 30.0);
        assert_eq!(cloudy.node().function_name(), Some("Filter.lessThan"));
        assert_eq!(
            cloudy.node().argument("leftField"),
            Some(&Node::constant("CLOUDY_PIXEL_PERCENTAGE"))
        );
    }
}
