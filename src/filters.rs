//! Structured filter predicates applied per collection.
//!
//! A [`Filter`] is a tree: leaves compare one property against a value,
//! inner nodes combine children with `and` / `or`. Filters are executed by
//! the agent in addition to (AND-combined with) the filters it picks itself.
//!
//! ```
//! use weaviate_agents::filters::Filter;
//!
//! let filter = Filter::by_property("price").greater_than(100)
//!     & Filter::by_property("status").equal("shipped");
//! let json = serde_json::to_value(&filter).unwrap();
//! assert_eq!(json["combine"], "and");
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr};

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
    /// Wildcard text match (`*` and `?`).
    Like,
    /// Property is (or is not) null.
    IsNull,
    /// Array property shares at least one value.
    ContainsAny,
    /// Array property holds every value.
    ContainsAll,
    /// Array property holds none of the values.
    ContainsNone,
}

/// How the children of a combined filter are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    /// All children must match.
    And,
    /// Any child may match.
    Or,
}

/// The right-hand side of a filter leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterLiteral {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text (also used for RFC 3339 dates).
    Text(String),
    /// List of booleans.
    Bools(Vec<bool>),
    /// List of integers.
    Ints(Vec<i64>),
    /// List of floats.
    Floats(Vec<f64>),
    /// List of texts.
    Texts(Vec<String>),
}

macro_rules! literal_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FilterLiteral {
                fn from(value: $ty) -> Self {
                    FilterLiteral::$variant(value.into())
                }
            }
        )*
    };
}

literal_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<bool> => Bools,
    Vec<i64> => Ints,
    Vec<f64> => Floats,
    Vec<String> => Texts,
}

impl From<Vec<&str>> for FilterLiteral {
    fn from(values: Vec<&str>) -> Self {
        FilterLiteral::Texts(values.into_iter().map(str::to_string).collect())
    }
}

/// A filter leaf: `target <operator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterValue {
    /// Property name the filter applies to.
    pub target: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Value compared against.
    pub value: FilterLiteral,
}

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    /// `and` / `or` over child filters.
    Combined {
        /// Join operator.
        combine: Combine,
        /// Child filters.
        filters: Vec<Filter>,
    },
    /// A single comparison.
    Value(FilterValue),
}

impl Filter {
    /// Start a leaf on the given property.
    pub fn by_property(name: impl Into<String>) -> PropertyFilterBuilder {
        PropertyFilterBuilder {
            target: name.into(),
        }
    }

    /// Combine filters so that all must match.
    pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::combine(Combine::And, filters)
    }

    /// Combine filters so that any may match.
    pub fn any_of(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::combine(Combine::Or, filters)
    }

    fn combine(combine: Combine, filters: impl IntoIterator<Item = Filter>) -> Self {
        // Flatten nested nodes with the same join so `a & b & c` stays one level.
        let mut flat = Vec::new();
        for filter in filters {
            match filter {
                Filter::Combined {
                    combine: inner,
                    filters,
                } if inner == combine => flat.extend(filters),
                other => flat.push(other),
            }
        }
        Filter::Combined {
            combine,
            filters: flat,
        }
    }

    /// Property names referenced anywhere in this tree.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Filter::Value(leaf) => vec![leaf.target.as_str()],
            Filter::Combined { filters, .. } => filters.iter().flat_map(Filter::targets).collect(),
        }
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        Filter::all_of([self, rhs])
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        Filter::any_of([self, rhs])
    }
}

/// Builder returned by [`Filter::by_property`].
#[derive(Debug, Clone)]
pub struct PropertyFilterBuilder {
    target: String,
}

impl PropertyFilterBuilder {
    fn leaf(self, operator: FilterOperator, value: impl Into<FilterLiteral>) -> Filter {
        Filter::Value(FilterValue {
            target: self.target,
            operator,
            value: value.into(),
        })
    }

    /// `property == value`
    pub fn equal(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::Equal, value)
    }

    /// `property != value`
    pub fn not_equal(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::NotEqual, value)
    }

    /// `property < value`
    pub fn less_than(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::LessThan, value)
    }

    /// `property <= value`
    pub fn less_or_equal(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::LessThanEqual, value)
    }

    /// `property > value`
    pub fn greater_than(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::GreaterThan, value)
    }

    /// `property >= value`
    pub fn greater_or_equal(self, value: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::GreaterThanEqual, value)
    }

    /// Wildcard match, e.g. `"*phone*"`.
    pub fn like(self, pattern: impl Into<String>) -> Filter {
        self.leaf(FilterOperator::Like, FilterLiteral::Text(pattern.into()))
    }

    /// `property IS NULL` when `true`, `IS NOT NULL` when `false`.
    pub fn is_none(self, is_null: bool) -> Filter {
        self.leaf(FilterOperator::IsNull, is_null)
    }

    /// Array property shares at least one of `values`.
    pub fn contains_any(self, values: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::ContainsAny, values)
    }

    /// Array property holds every one of `values`.
    pub fn contains_all(self, values: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::ContainsAll, values)
    }

    /// Array property holds none of `values`.
    pub fn contains_none(self, values: impl Into<FilterLiteral>) -> Filter {
        self.leaf(FilterOperator::ContainsNone, values)
    }
}
