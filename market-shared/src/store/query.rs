use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::pagination::{PageRange, SortDirection};

/// Relations exposed by the hosted query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Posts,
    Likes,
    SavedPosts,
    Profiles,
    Reviews,
    Messages,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Likes => "likes",
            Self::SavedPosts => "saved_posts",
            Self::Profiles => "profiles",
            Self::Reviews => "reviews",
            Self::Messages => "messages",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Self::Posts),
            "likes" => Ok(Self::Likes),
            "saved_posts" => Ok(Self::SavedPosts),
            "profiles" => Ok(Self::Profiles),
            "reviews" => Ok(Self::Reviews),
            "messages" => Ok(Self::Messages),
            _ => Err(format!("unknown relation: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsValue {
    Null,
    True,
    False,
}

impl IsValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::True => "true",
            Self::False => "false",
        }
    }

    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Null, None | Some(Value::Null)) => true,
            (Self::True, Some(Value::Bool(true))) => true,
            (Self::False, Some(Value::Bool(false))) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Is(IsValue),
    In(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self { column, op: FilterOp::Eq(value.into()) }
    }

    pub fn is(column: &'static str, value: IsValue) -> Self {
        Self { column, op: FilterOp::Is(value) }
    }

    pub fn one_of<V: Into<Value>>(column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            column,
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        let cell = row.get(self.column);
        match &self.op {
            FilterOp::Eq(v) => cell == Some(v),
            FilterOp::Is(v) => v.matches(cell),
            FilterOp::In(vs) => cell.is_some_and(|c| vs.contains(c)),
        }
    }
}

/// Foreign-key expansion: attach the `relation` row whose id equals `via`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embed {
    pub relation: Relation,
    pub via: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub relation: Relation,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub range: Option<PageRange>,
    pub embeds: Vec<Embed>,
}

impl Select {
    pub fn from(relation: Relation) -> Self {
        Self {
            relation,
            filters: Vec::new(),
            order: None,
            range: None,
            embeds: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn is(self, column: &'static str, value: IsValue) -> Self {
        self.filter(Filter::is(column, value))
    }

    pub fn one_of<V: Into<Value>>(self, column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::one_of(column, values))
    }

    pub fn order(mut self, column: &'static str, direction: SortDirection) -> Self {
        self.order = Some(Order { column, direction });
        self
    }

    pub fn range(mut self, range: PageRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Expand the author's profile through the `author` column.
    pub fn with_author(mut self) -> Self {
        self.embeds.push(Embed { relation: Relation::Profiles, via: "author" });
        self
    }
}
