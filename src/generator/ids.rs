/// First free id of each table, one past the maximum already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBases {
    pub user: i64,
    pub event: i64,
    pub order: i64,
}

impl IdBases {
    /// Empty tables report a maximum of 0.
    pub fn from_maxima(max_user: i64, max_event: i64, max_order: i64) -> Self {
        Self {
            user: max_user + 1,
            event: max_event + 1,
            order: max_order + 1,
        }
    }
}

/// Running event and order counters shared by every session of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCursor {
    next_event: i64,
    next_order: i64,
}

impl IdCursor {
    pub fn new(bases: IdBases) -> Self {
        Self {
            next_event: bases.event,
            next_order: bases.order,
        }
    }

    pub fn next_event(&mut self) -> i64 {
        let id = self.next_event;
        self.next_event += 1;
        id
    }

    pub fn next_order(&mut self) -> i64 {
        let id = self.next_order;
        self.next_order += 1;
        id
    }

    pub fn peek_event(&self) -> i64 {
        self.next_event
    }

    pub fn peek_order(&self) -> i64 {
        self.next_order
    }
}
