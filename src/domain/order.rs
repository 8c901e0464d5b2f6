//! Orders, their lifecycle states and broker notifications.

use chrono::NaiveDateTime;
use std::fmt;

use super::position::TradeRecord;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Limit(f64),
    Stop(f64),
}

impl OrderKind {
    pub fn price(&self) -> Option<f64> {
        match *self {
            OrderKind::Market => None,
            OrderKind::Limit(p) | OrderKind::Stop(p) => Some(p),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::Limit(p) => write!(f, "limit {p:.4}"),
            OrderKind::Stop(p) => write!(f, "stop {p:.4}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Registered but not yet matchable (children wait for the parent fill).
    Submitted,
    Accepted,
    Completed,
    Canceled,
    /// Rejected at fill time: insufficient cash, or a fill that would take
    /// the position through zero.
    Margin,
}

impl OrderStatus {
    pub fn is_alive(self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::Accepted)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_alive()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Completed => "Completed",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Margin => "Margin",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub created_at: NaiveDateTime,
    /// Activated only once this order fills; canceled if it dies unfilled.
    pub parent: Option<OrderId>,
    /// One-cancels-other sibling. The link is made reciprocal by the broker.
    pub oco: Option<OrderId>,
}

impl OrderRequest {
    pub fn market(ticker: &str, side: Side, quantity: u64, created_at: NaiveDateTime) -> Self {
        Self {
            ticker: ticker.to_string(),
            side,
            kind: OrderKind::Market,
            quantity,
            created_at,
            parent: None,
            oco: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub ticker: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub created_at: NaiveDateTime,
    pub parent: Option<OrderId>,
    pub oco: Option<OrderId>,
    pub status: OrderStatus,
    /// Matching starts on the first bar strictly after this timestamp.
    pub active_from: Option<NaiveDateTime>,
    pub fill_price: Option<f64>,
    pub filled_at: Option<NaiveDateTime>,
    pub commission: f64,
}

impl Order {
    pub fn from_request(id: OrderId, request: OrderRequest) -> Self {
        Self {
            id,
            ticker: request.ticker,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            created_at: request.created_at,
            parent: request.parent,
            oco: request.oco,
            status: OrderStatus::Submitted,
            active_from: None,
            fill_price: None,
            filled_at: None,
            commission: 0.0,
        }
    }

    pub fn price(&self) -> Option<f64> {
        self.kind.price()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn event(&self, timestamp: NaiveDateTime) -> OrderEvent {
        OrderEvent {
            order_id: self.id,
            ticker: self.ticker.clone(),
            side: self.side,
            kind: self.kind,
            status: self.status,
            quantity: self.quantity,
            fill_price: self.fill_price,
            commission: self.commission,
            parent: self.parent,
            timestamp,
        }
    }
}

/// Snapshot of an order at a status change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub ticker: String,
    pub side: Side,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub quantity: u64,
    pub fill_price: Option<f64>,
    pub commission: f64,
    pub parent: Option<OrderId>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Order(OrderEvent),
    TradeClosed(TradeRecord),
}
