//! Query filters and ordering for listing sessions.
//!
//! Directory services only let you filter and sort on a handful of
//! built-in fields. We model those fields as enums so a query can't name
//! a field that doesn't exist, and keep the matching/sorting logic here so
//! every directory implementation applies it the same way.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::Session;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Fields a query filter can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterField {
    AvailableSlots,
    MaxPlayers,
    PlayerCount,
    Name,
}

/// Comparison operator for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl FilterOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
        }
    }
}

/// A single `field op value` condition.
///
/// The value is a string, like on the wire. Numeric fields parse it; a
/// value that doesn't parse never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

impl QueryFilter {
    pub fn new(field: FilterField, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }

    /// The filter every lobby browser uses: "has at least one open slot".
    pub fn has_open_slots() -> Self {
        Self::new(FilterField::AvailableSlots, FilterOp::Gt, "0")
    }

    /// Returns `true` if `session` satisfies this condition.
    pub fn matches(&self, session: &Session) -> bool {
        let ord = match self.field {
            FilterField::Name => Some(session.name.as_str().cmp(self.value.as_str())),
            FilterField::AvailableSlots => compare_number(session.available_slots(), &self.value),
            FilterField::MaxPlayers => compare_number(session.max_players, &self.value),
            FilterField::PlayerCount => compare_number(session.player_count(), &self.value),
        };
        ord.is_some_and(|o| self.op.holds(o))
    }
}

fn compare_number(actual: usize, value: &str) -> Option<Ordering> {
    let wanted: i64 = value.trim().parse().ok()?;
    Some((actual as i64).cmp(&wanted))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Fields results can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    AvailableSlots,
    Created,
    Name,
    MaxPlayers,
}

/// One step of an "order by x, then y, then ..." chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOrder {
    pub field: SortField,
    pub ascending: bool,
}

impl QueryOrder {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            ascending: true,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            ascending: false,
        }
    }

    fn compare(&self, a: &Session, b: &Session) -> Ordering {
        let ord = match self.field {
            SortField::AvailableSlots => a.available_slots().cmp(&b.available_slots()),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Name => a.name.cmp(&b.name),
            SortField::MaxPlayers => a.max_players.cmp(&b.max_players),
        };
        if self.ascending { ord } else { ord.reverse() }
    }
}

/// Compares two sessions by walking the ordering chain until one step
/// tells them apart.
pub fn compare_sessions(a: &Session, b: &Session, order: &[QueryOrder]) -> Ordering {
    order
        .iter()
        .map(|o| o.compare(a, b))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A full list query: filters, ordering chain, and a result cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    pub filters: Vec<QueryFilter>,
    pub order: Vec<QueryOrder>,
    pub count: usize,
}

impl SessionQuery {
    /// Default result cap when none is given.
    pub const DEFAULT_COUNT: usize = 20;

    /// The lobby-browser query: sessions with open slots, fullest first,
    /// then newest first, then by name descending.
    pub fn open_lobbies(count: usize) -> Self {
        Self {
            filters: vec![QueryFilter::has_open_slots()],
            order: vec![
                QueryOrder::asc(SortField::AvailableSlots),
                QueryOrder::desc(SortField::Created),
                QueryOrder::desc(SortField::Name),
            ],
            count,
        }
    }

    /// Returns `true` if `session` passes every filter.
    pub fn matches(&self, session: &Session) -> bool {
        self.filters.iter().all(|f| f.matches(session))
    }

    /// Filters, sorts, and truncates `sessions` according to this query.
    ///
    /// The sort is stable, so sessions the ordering chain considers equal
    /// keep the order they came in.
    pub fn apply<I>(&self, sessions: I) -> Vec<Session>
    where
        I: IntoIterator<Item = Session>,
    {
        let mut hits: Vec<Session> =
            sessions.into_iter().filter(|s| self.matches(s)).collect();
        hits.sort_by(|a, b| compare_sessions(a, b, &self.order));
        hits.truncate(self.count);
        hits
    }
}

impl Default for SessionQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: Vec::new(),
            count: Self::DEFAULT_COUNT,
        }
    }
}

/// What quick-join is allowed to pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickJoinCriteria {
    pub filters: Vec<QueryFilter>,
}

impl QuickJoinCriteria {
    pub fn matches(&self, session: &Session) -> bool {
        self.filters.iter().all(|f| f.matches(session))
    }
}

/// Any session with at least one open slot.
impl Default for QuickJoinCriteria {
    fn default() -> Self {
        Self {
            filters: vec![QueryFilter::has_open_slots()],
        }
    }
}
