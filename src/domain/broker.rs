//! Simulated broker used by the backtest driver.
//!
//! Orders submitted on a bar are matched from the instrument's next bar on.
//! Child orders wait in `Submitted` until their parent fills; one-cancels-other
//! siblings are canceled as soon as one of them fills.

use chrono::NaiveDateTime;
use log::{debug, info};
use std::collections::BTreeMap;

use super::candle::Candle;
use super::execution::{calculate_commission, fill_price};
use super::order::{BrokerEvent, Order, OrderId, OrderRequest, OrderStatus, Side};
use super::portfolio::Portfolio;
use super::position::{Fill, TradeRecord};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone)]
pub struct SimBroker {
    portfolio: Portfolio,
    commission_rate: f64,
    orders: BTreeMap<OrderId, Order>,
    next_id: OrderId,
    events: Vec<BrokerEvent>,
    trades: Vec<TradeRecord>,
    clock: Option<NaiveDateTime>,
}

impl SimBroker {
    pub fn new(initial_capital: f64, commission_rate: f64) -> Self {
        Self {
            portfolio: Portfolio::new(initial_capital),
            commission_rate,
            orders: BTreeMap::new(),
            next_id: 1,
            events: Vec::new(),
            trades: Vec::new(),
            clock: None,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Drain notifications queued since the last call.
    pub fn take_events(&mut self) -> Vec<BrokerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn record_equity(&mut self, date: chrono::NaiveDate) {
        self.portfolio.record_equity(date);
    }

    /// Match live orders of `ticker` against `candle`, then mark the
    /// instrument at its close. Returns every event raised so far.
    pub fn process_bar(&mut self, ticker: &str, bar: usize, candle: &Candle) -> Vec<BrokerEvent> {
        self.clock = Some(candle.timestamp);

        let ready: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| {
                o.ticker == ticker
                    && o.status == OrderStatus::Accepted
                    && o.active_from.is_some_and(|t| t < candle.timestamp)
            })
            .map(|o| o.id)
            .collect();

        for id in ready {
            // an earlier fill on this bar may have canceled it
            if self.orders.get(&id).is_some_and(|o| o.status == OrderStatus::Accepted) {
                self.try_fill(id, bar, candle);
            }
        }

        self.portfolio.mark(ticker, candle.close);
        self.take_events()
    }

    fn try_fill(&mut self, id: OrderId, bar: usize, candle: &Candle) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let Some(price) = fill_price(order.side, order.kind, candle) else {
            return;
        };
        let ticker = order.ticker.clone();
        let side = order.side;
        let quantity = order.quantity;
        let commission = calculate_commission(quantity, price, self.commission_rate);

        let opening_long = side == Side::Buy && self.portfolio.quantity(&ticker) >= 0;
        if opening_long && quantity as f64 * price + commission > self.portfolio.cash {
            info!(
                "{} | order {} rejected: cost {:.2} exceeds cash {:.2}",
                ticker,
                id,
                quantity as f64 * price + commission,
                self.portfolio.cash
            );
            self.set_status(id, OrderStatus::Margin, candle.timestamp);
            self.cancel_children(id, candle.timestamp);
            return;
        }

        let held = self.portfolio.quantity(&ticker);
        let signed = side.sign() * quantity as i64;
        if held.signum() == -signed.signum() && signed.unsigned_abs() > held.unsigned_abs() {
            info!(
                "{} | order {} rejected: {:?} {} would cross held {}",
                ticker, id, side, quantity, held
            );
            self.set_status(id, OrderStatus::Margin, candle.timestamp);
            self.cancel_children(id, candle.timestamp);
            return;
        }

        if let Some(order) = self.orders.get_mut(&id) {
            order.status = OrderStatus::Completed;
            order.fill_price = Some(price);
            order.filled_at = Some(candle.timestamp);
            order.commission = commission;
            self.events.push(BrokerEvent::Order(order.event(candle.timestamp)));
        }
        debug!(
            "{} | order {} filled {:?} {} @ {:.4} comm={:.4}",
            ticker, id, side, quantity, price, commission
        );

        let fill = Fill {
            quantity: side.sign() * quantity as i64,
            price,
            commission,
            time: candle.timestamp,
            bar,
        };
        if let Some(record) = self.portfolio.apply_fill(&ticker, &fill) {
            self.trades.push(record.clone());
            self.events.push(BrokerEvent::TradeClosed(record));
        }

        self.activate_children(id, candle.timestamp);
        let sibling = self.orders.get(&id).and_then(|o| o.oco);
        if let Some(sibling) = sibling {
            self.cancel_at(sibling, candle.timestamp);
        }
    }

    fn set_status(&mut self, id: OrderId, status: OrderStatus, at: NaiveDateTime) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.status = status;
            if status == OrderStatus::Accepted {
                order.active_from = Some(at);
            }
            self.events.push(BrokerEvent::Order(order.event(at)));
        }
    }

    fn children_of(&self, parent: OrderId) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.parent == Some(parent) && o.is_alive())
            .map(|o| o.id)
            .collect()
    }

    fn activate_children(&mut self, parent: OrderId, at: NaiveDateTime) {
        for child in self.children_of(parent) {
            self.set_status(child, OrderStatus::Accepted, at);
        }
    }

    fn cancel_children(&mut self, parent: OrderId, at: NaiveDateTime) {
        for child in self.children_of(parent) {
            self.cancel_at(child, at);
        }
    }

    fn cancel_at(&mut self, id: OrderId, at: NaiveDateTime) {
        if !self.orders.get(&id).is_some_and(|o| o.is_alive()) {
            return;
        }
        self.set_status(id, OrderStatus::Canceled, at);
        self.cancel_children(id, at);
    }
}

impl BrokerPort for SimBroker {
    fn cash(&self) -> f64 {
        self.portfolio.cash
    }

    fn portfolio_value(&self) -> f64 {
        self.portfolio.total_equity()
    }

    fn position(&self, ticker: &str) -> i64 {
        self.portfolio.quantity(ticker)
    }

    fn live_orders(&self, ticker: &str) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|o| o.ticker == ticker && o.is_alive())
            .collect()
    }

    fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    fn submit(&mut self, request: OrderRequest) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;

        let at = request.created_at;
        let order = Order::from_request(id, request);
        let parent_status = order
            .parent
            .and_then(|p| self.orders.get(&p))
            .map(|p| p.status);
        if let Some(sibling) = order.oco.and_then(|s| self.orders.get_mut(&s)) {
            sibling.oco = Some(id);
        }
        self.events.push(BrokerEvent::Order(order.event(at)));
        self.orders.insert(id, order);

        match parent_status {
            None | Some(OrderStatus::Completed) => self.set_status(id, OrderStatus::Accepted, at),
            Some(OrderStatus::Canceled | OrderStatus::Margin) => self.cancel_at(id, at),
            Some(OrderStatus::Submitted | OrderStatus::Accepted) => {}
        }
        id
    }

    fn cancel(&mut self, id: OrderId) {
        let at = self
            .clock
            .or_else(|| self.orders.get(&id).map(|o| o.created_at));
        if let Some(at) = at {
            self.cancel_at(id, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderKind;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(18, minute, 0)
            .unwrap()
    }

    fn candle(minute: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: at(minute),
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    fn request(side: Side, kind: OrderKind, quantity: u64, minute: u32) -> OrderRequest {
        OrderRequest {
            ticker: "SBER".into(),
            side,
            kind,
            quantity,
            created_at: at(minute),
            parent: None,
            oco: None,
        }
    }

    /// Entry limit buy with take-profit and stop-loss children.
    fn bracket(broker: &mut SimBroker, minute: u32) -> (OrderId, OrderId, OrderId) {
        let entry = broker.submit(request(Side::Buy, OrderKind::Limit(100.0), 10, minute));
        let take = broker.submit(OrderRequest {
            parent: Some(entry),
            ..request(Side::Sell, OrderKind::Limit(100.3), 10, minute)
        });
        let stop = broker.submit(OrderRequest {
            parent: Some(entry),
            oco: Some(take),
            ..request(Side::Sell, OrderKind::Stop(99.9), 10, minute)
        });
        (entry, take, stop)
    }

    fn status(broker: &SimBroker, id: OrderId) -> OrderStatus {
        broker.order(id).unwrap().status
    }

    #[test]
    fn submit_emits_submitted_then_accepted() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let id = broker.submit(request(Side::Buy, OrderKind::Market, 1, 0));
        let events = broker.take_events();
        let statuses: Vec<OrderStatus> = events
            .iter()
            .filter_map(|e| match e {
                BrokerEvent::Order(o) if o.order_id == id => Some(o.status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![OrderStatus::Submitted, OrderStatus::Accepted]);
    }

    #[test]
    fn order_not_matched_on_its_own_bar() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let id = broker.submit(request(Side::Buy, OrderKind::Market, 1, 0));
        broker.process_bar("SBER", 0, &candle(0, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(status(&broker, id), OrderStatus::Accepted);

        broker.process_bar("SBER", 1, &candle(1, 101.0, 102.0, 100.0, 101.0));
        let order = broker.order(id).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.fill_price, Some(101.0));
        assert_eq!(broker.position("SBER"), 1);
    }

    #[test]
    fn other_ticker_bar_does_not_match() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let id = broker.submit(request(Side::Buy, OrderKind::Market, 1, 0));
        broker.process_bar("GAZP", 0, &candle(1, 10.0, 10.0, 10.0, 10.0));
        assert_eq!(status(&broker, id), OrderStatus::Accepted);
    }

    #[test]
    fn bracket_children_wait_for_parent() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let (entry, take, stop) = bracket(&mut broker, 0);
        assert_eq!(status(&broker, entry), OrderStatus::Accepted);
        assert_eq!(status(&broker, take), OrderStatus::Submitted);
        assert_eq!(status(&broker, stop), OrderStatus::Submitted);
        assert_eq!(broker.order(take).unwrap().oco, Some(stop));

        // entry fills; the wide bar would hit both exits but children start next bar
        broker.process_bar("SBER", 1, &candle(1, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(status(&broker, entry), OrderStatus::Completed);
        assert_eq!(status(&broker, take), OrderStatus::Accepted);
        assert_eq!(status(&broker, stop), OrderStatus::Accepted);
        assert_eq!(broker.position("SBER"), 10);
    }

    #[test]
    fn take_profit_fill_cancels_stop_and_closes_trade() {
        let mut broker = SimBroker::new(10_000.0, 0.0004);
        let (_, take, stop) = bracket(&mut broker, 0);
        broker.process_bar("SBER", 1, &candle(1, 100.0, 100.1, 99.95, 100.0));
        let events = broker.process_bar("SBER", 2, &candle(2, 100.1, 100.5, 100.0, 100.4));

        assert_eq!(status(&broker, take), OrderStatus::Completed);
        assert_eq!(status(&broker, stop), OrderStatus::Canceled);
        assert_eq!(broker.position("SBER"), 0);

        let record = events
            .iter()
            .find_map(|e| match e {
                BrokerEvent::TradeClosed(r) => Some(r.clone()),
                _ => None,
            })
            .expect("trade closed");
        assert!((record.gross_pnl - 3.0).abs() < 1e-9);
        let commission = 0.0004 * 10.0 * (100.0 + 100.3);
        assert!((record.net_pnl - (3.0 - commission)).abs() < 1e-9);
        assert_eq!(record.bars_held, 1);
        assert_eq!(broker.trades().len(), 1);
    }

    #[test]
    fn stop_loss_fill_cancels_take() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let (_, take, stop) = bracket(&mut broker, 0);
        broker.process_bar("SBER", 1, &candle(1, 100.0, 100.1, 99.95, 100.0));
        broker.process_bar("SBER", 2, &candle(2, 99.95, 100.0, 99.5, 99.6));
        assert_eq!(status(&broker, stop), OrderStatus::Completed);
        assert_eq!(status(&broker, take), OrderStatus::Canceled);
        assert!((broker.trades()[0].net_pnl + 1.0).abs() < 1e-9);
    }

    #[test]
    fn canceling_parent_cancels_children() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        let (entry, take, stop) = bracket(&mut broker, 0);
        broker.cancel(entry);
        assert_eq!(status(&broker, entry), OrderStatus::Canceled);
        assert_eq!(status(&broker, take), OrderStatus::Canceled);
        assert_eq!(status(&broker, stop), OrderStatus::Canceled);
        assert!(broker.live_orders("SBER").is_empty());
    }

    #[test]
    fn insufficient_cash_is_margin() {
        let mut broker = SimBroker::new(500.0, 0.0);
        let (entry, take, _) = bracket(&mut broker, 0);
        broker.process_bar("SBER", 1, &candle(1, 100.0, 100.0, 100.0, 100.0));
        assert_eq!(status(&broker, entry), OrderStatus::Margin);
        assert_eq!(status(&broker, take), OrderStatus::Canceled);
        assert_eq!(broker.position("SBER"), 0);
        assert!((broker.cash() - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_larger_than_holding_is_rejected() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        broker.submit(request(Side::Buy, OrderKind::Market, 10, 0));
        broker.process_bar("SBER", 1, &candle(1, 100.0, 100.0, 100.0, 100.0));
        let sell = broker.submit(request(Side::Sell, OrderKind::Market, 30, 1));
        broker.process_bar("SBER", 2, &candle(2, 101.0, 101.0, 101.0, 101.0));

        assert_eq!(status(&broker, sell), OrderStatus::Margin);
        assert_eq!(broker.position("SBER"), 10);
        assert!(broker.trades().is_empty());
    }

    #[test]
    fn portfolio_value_marks_to_close() {
        let mut broker = SimBroker::new(10_000.0, 0.0);
        broker.submit(request(Side::Buy, OrderKind::Market, 10, 0));
        broker.process_bar("SBER", 1, &candle(1, 100.0, 100.0, 100.0, 105.0));
        assert!((broker.cash() - 9_000.0).abs() < 1e-9);
        assert!((broker.portfolio_value() - 10_050.0).abs() < 1e-9);
    }
}
