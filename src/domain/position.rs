//! Signed positions and closed trade records.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

/// A fill against a position: signed quantity and execution details.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub quantity: i64,
    pub price: f64,
    pub commission: f64,
    pub time: NaiveDateTime,
    pub bar: usize,
}

/// Open position in one instrument. Removed from the portfolio when flat.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub direction: Direction,
    pub quantity: i64,
    pub avg_price: f64,
    pub opened_at: NaiveDateTime,
    pub opened_bar: usize,
    /// Largest absolute size reached while open.
    pub peak_quantity: u64,
    pub commission: f64,
    pub realized_gross: f64,
    exit_value: f64,
    exit_quantity: u64,
}

/// Result of applying one fill to a position.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Open(Position),
    Closed(TradeRecord),
}

impl Position {
    pub fn open(ticker: &str, fill: &Fill) -> Self {
        Position {
            ticker: ticker.to_string(),
            direction: if fill.quantity > 0 {
                Direction::Long
            } else {
                Direction::Short
            },
            quantity: fill.quantity,
            avg_price: fill.price,
            opened_at: fill.time,
            opened_bar: fill.bar,
            peak_quantity: fill.quantity.unsigned_abs(),
            commission: fill.commission,
            realized_gross: 0.0,
            exit_value: 0.0,
            exit_quantity: 0,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Apply a fill. Adding to the position averages the entry price;
    /// reducing it realizes PnL against that average. An opposite fill never
    /// exceeds the held size: the broker rejects fills that would cross zero.
    pub fn apply(mut self, fill: &Fill) -> FillOutcome {
        if fill.quantity == 0 {
            return FillOutcome::Open(self);
        }
        if (self.quantity > 0) == (fill.quantity > 0) {
            let held = self.quantity.unsigned_abs() as f64;
            let added = fill.quantity.unsigned_abs() as f64;
            self.avg_price = (self.avg_price * held + fill.price * added) / (held + added);
            self.quantity += fill.quantity;
            self.peak_quantity = self.peak_quantity.max(self.quantity.unsigned_abs());
            self.commission += fill.commission;
            return FillOutcome::Open(self);
        }

        let closing = self.quantity.unsigned_abs().min(fill.quantity.unsigned_abs());
        self.realized_gross +=
            closing as f64 * (fill.price - self.avg_price) * self.quantity.signum() as f64;
        self.commission += fill.commission;
        self.exit_value += closing as f64 * fill.price;
        self.exit_quantity += closing;
        self.quantity += fill.quantity.signum() * closing as i64;

        if self.quantity != 0 {
            return FillOutcome::Open(self);
        }
        FillOutcome::Closed(self.into_record(fill))
    }

    fn into_record(self, fill: &Fill) -> TradeRecord {
        let exit_price = if self.exit_quantity > 0 {
            self.exit_value / self.exit_quantity as f64
        } else {
            fill.price
        };
        TradeRecord {
            ticker: self.ticker,
            direction: self.direction,
            entry_time: self.opened_at,
            exit_time: fill.time,
            bars_held: fill.bar.saturating_sub(self.opened_bar),
            quantity: self.peak_quantity,
            entry_price: self.avg_price,
            exit_price,
            gross_pnl: self.realized_gross,
            commission: self.commission,
            net_pnl: self.realized_gross - self.commission,
        }
    }
}

/// A completed round trip, produced when a position returns to flat.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub ticker: String,
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub bars_held: usize,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.net_pnl < 0.0
    }
}
