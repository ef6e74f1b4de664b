//! Order registry: owns orders, positions and groups for one trading session.
//!
//! The registry is the central state machine of the engine. It manages:
//! - Order storage keyed by ascending id (active + historical)
//! - State transitions (Pending → Triggered → Filled / Rejected, or Cancelled)
//! - OCO/bracket groups as a separate index (one fill cancels all siblings)
//! - Bracket legs held dormant until their entry fills
//! - Positions opened, extended and closed by fills
//! - Audit trail for every state transition
//!
//! The registry does NOT price fills. Triggered orders are handed to an
//! [`ExecutionGateway`] and the result is recorded as-is.

use crate::domain::{
    Bracket, BracketSpec, Fill, GroupId, GroupKind, Intent, Order, OrderAuditEntry, OrderGroup,
    OrderId, OrderKind, OrderSpec, OrderStatus, Position, PositionId, PriceTick, RejectionReason,
    Side, TrailingStopTracker,
};
use crate::engine::event::{CancelReason, OrderEvent};
use crate::engine::trigger::is_triggered;
use crate::gateway::ExecutionGateway;
use crate::risk::{self, RiskError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} is already terminal ({1})")]
    AlreadyTerminal(OrderId, OrderStatus),

    #[error("invalid bracket: {0}")]
    InvalidBracket(#[from] RiskError),
}

fn invalid(msg: impl Into<String>) -> OrderError {
    OrderError::InvalidOrder(msg.into())
}

/// Final state handed back by [`OrderRegistry::teardown`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub instrument: String,
    pub ticks_processed: u64,
    pub last_price: Option<Decimal>,
    pub orders: Vec<Order>,
    pub positions: Vec<Position>,
    pub groups: Vec<OrderGroup>,
    pub audit_trail: Vec<OrderAuditEntry>,
}

impl SessionReport {
    pub fn realized_pnl(&self) -> Decimal {
        self.positions.iter().map(|p| p.realized_pnl).sum()
    }
}

/// Where a newly placed order lands group-wise.
enum GroupPlan {
    None,
    Join(GroupId),
    New(Vec<OrderId>),
}

/// Orders, positions and groups for one instrument, driven tick by tick.
///
/// Construct one per trading session and consume it with [`teardown`]
/// when the session ends.
///
/// [`teardown`]: OrderRegistry::teardown
#[derive(Debug, Clone)]
pub struct OrderRegistry {
    instrument: String,

    /// All orders keyed by id. Iteration order is evaluation order.
    orders: BTreeMap<OrderId, Order>,

    positions: BTreeMap<PositionId, Position>,

    groups: BTreeMap<GroupId, OrderGroup>,

    /// Bracket legs waiting for their entry to fill.
    /// Key: entry order id. Value: leg ids (stop, target).
    dormant: BTreeMap<OrderId, Vec<OrderId>>,

    /// Cancels requested while the order was executing. Applied unless the
    /// order fills.
    queued_cancels: BTreeSet<OrderId>,

    audit_trail: Vec<OrderAuditEntry>,

    next_order_id: u64,
    next_position_id: u64,
    next_group_id: u64,
    tick: u64,
    last_price: Option<Decimal>,
}

impl OrderRegistry {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            orders: BTreeMap::new(),
            positions: BTreeMap::new(),
            groups: BTreeMap::new(),
            dormant: BTreeMap::new(),
            queued_cancels: BTreeSet::new(),
            audit_trail: Vec::new(),
            next_order_id: 1,
            next_position_id: 1,
            next_group_id: 1,
            tick: 0,
            last_price: None,
        }
    }

    // ── Placement ──────────────────────────────────────────────────────

    /// Seed an existing exposure, e.g. one opened outside this session.
    pub fn open_position(
        &mut self,
        side: Side,
        entry_price: Decimal,
        size: Decimal,
    ) -> Result<PositionId, OrderError> {
        if entry_price <= Decimal::ZERO {
            return Err(invalid(format!("entry price must be positive, got {entry_price}")));
        }
        if size <= Decimal::ZERO {
            return Err(invalid(format!("size must be positive, got {size}")));
        }
        let id = self.alloc_position_id();
        self.positions
            .insert(id, Position::new(id, side, entry_price, size));
        info!(position_id = %id, %side, %entry_price, %size, "position opened");
        Ok(id)
    }

    /// Validate and insert a Pending order.
    ///
    /// Trailing stops on a referenced position activate immediately at the
    /// position's entry price; otherwise they activate on their first tick.
    pub fn place(&mut self, spec: OrderSpec) -> Result<Order, OrderError> {
        self.validate(&spec)?;
        let plan = self.plan_group(&spec.linked_order_ids)?;

        let id = self.alloc_order_id();
        let mut order = self.new_order(id, &spec);
        if let (Some(tracker), Some(pid)) = (order.trailing.as_mut(), spec.position_id) {
            if let Some(position) = self.positions.get(&pid) {
                tracker.activate(position.entry_price);
            }
        }
        sync_trailing_trigger(&mut order);

        order.group_id = match plan {
            GroupPlan::None => None,
            GroupPlan::Join(group_id) => {
                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.member_order_ids.push(id);
                }
                Some(group_id)
            }
            GroupPlan::New(mut members) => {
                let group_id = self.alloc_group_id();
                for member in &members {
                    if let Some(o) = self.orders.get_mut(member) {
                        o.group_id = Some(group_id);
                    }
                }
                members.push(id);
                self.groups.insert(
                    group_id,
                    OrderGroup {
                        id: group_id,
                        kind: GroupKind::Oco,
                        member_order_ids: members,
                        risk: None,
                    },
                );
                Some(group_id)
            }
        };

        info!(
            order_id = %id,
            kind = ?order.kind,
            side = %order.side,
            size = %order.size,
            trigger = ?order.trigger_price,
            "order placed"
        );
        self.orders.insert(id, order.clone());
        self.record_audit(id, OrderStatus::Pending, OrderStatus::Pending, "placed");
        Ok(order)
    }

    /// Place an entry limit with stop-loss and take-profit legs.
    ///
    /// The legs form a bracket group and stay dormant until the entry fills.
    /// They then attach to the opened position and become eligible from the
    /// next tick on.
    pub fn place_bracket(&mut self, spec: BracketSpec) -> Result<Bracket, OrderError> {
        for (name, price) in [
            ("entry", spec.entry_price),
            ("stop", spec.stop_price),
            ("target", spec.target_price),
        ] {
            if price <= Decimal::ZERO {
                return Err(invalid(format!("bracket {name} price must be positive, got {price}")));
            }
        }
        let rr = risk::compute(
            spec.entry_price,
            spec.stop_price,
            spec.target_price,
            spec.side,
            spec.size,
        )?;
        if let Some(pct) = spec.trail_percent {
            validate_trail_percent(pct)?;
        }

        let entry_id = self.alloc_order_id();
        let stop_id = self.alloc_order_id();
        let target_id = self.alloc_order_id();
        let group_id = self.alloc_group_id();

        let entry = self.new_order(
            entry_id,
            &OrderSpec::limit(spec.side, Intent::Open, spec.entry_price, spec.size),
        );

        let mut stop = match spec.trail_percent {
            Some(pct) => {
                let mut o =
                    self.new_order(stop_id, &OrderSpec::trailing_stop(spec.side, pct, spec.size));
                o.trailing = Some(
                    TrailingStopTracker::new(spec.side, pct).with_floor(spec.stop_price),
                );
                o
            }
            None => self.new_order(
                stop_id,
                &OrderSpec::bracket_stop(spec.side, spec.stop_price, spec.size),
            ),
        };
        let mut target = self.new_order(
            target_id,
            &OrderSpec::bracket_target(spec.side, spec.target_price, spec.size),
        );
        for leg in [&mut stop, &mut target] {
            leg.parent_id = Some(entry_id);
            leg.group_id = Some(group_id);
        }

        self.groups.insert(
            group_id,
            OrderGroup {
                id: group_id,
                kind: GroupKind::Bracket,
                member_order_ids: vec![stop_id, target_id],
                risk: Some(rr.clone()),
            },
        );
        self.dormant.insert(entry_id, vec![stop_id, target_id]);

        for order in [entry, stop, target] {
            let id = order.id;
            self.orders.insert(id, order);
            self.record_audit(id, OrderStatus::Pending, OrderStatus::Pending, "placed");
        }

        info!(
            %entry_id,
            %stop_id,
            %target_id,
            side = %spec.side,
            ratio = %rr.ratio,
            "bracket placed"
        );
        Ok(Bracket {
            entry_id,
            stop_id,
            target_id,
            group_id,
            risk: rr,
        })
    }

    // ── Tick processing ────────────────────────────────────────────────

    /// Evaluate every live order against one price, in ascending id order.
    ///
    /// Each order is looked at once. Orders cancelled earlier in the same
    /// pass (group siblings, orders on a position that just closed) are
    /// skipped. Bracket legs activated during the pass wait for the next tick.
    pub fn on_price_tick<G>(&mut self, tick: &PriceTick, gateway: &mut G) -> Vec<OrderEvent>
    where
        G: ExecutionGateway + ?Sized,
    {
        if tick.instrument != self.instrument {
            warn!(
                expected = %self.instrument,
                got = %tick.instrument,
                "tick for another instrument ignored"
            );
            return Vec::new();
        }
        if tick.price <= Decimal::ZERO {
            warn!(price = %tick.price, "non-positive tick ignored");
            return Vec::new();
        }

        self.tick += 1;
        self.last_price = Some(tick.price);

        let dormant: BTreeSet<OrderId> = self.dormant.values().flatten().copied().collect();
        let candidates: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && !dormant.contains(&o.id))
            .map(|o| o.id)
            .collect();

        let mut events = Vec::new();
        for id in candidates {
            self.evaluate(id, tick.price, gateway, &mut events);
        }
        events
    }

    fn evaluate<G>(
        &mut self,
        id: OrderId,
        price: Decimal,
        gateway: &mut G,
        events: &mut Vec<OrderEvent>,
    ) where
        G: ExecutionGateway + ?Sized,
    {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        if order.status != OrderStatus::Pending {
            return;
        }

        if let Some(tracker) = order.trailing.as_mut() {
            let trigger = tracker.observe(price);
            if order.trigger_price != Some(trigger) {
                order.trigger_price = Some(trigger);
                debug!(order_id = %id, trigger = %trigger, "trailing stop moved");
                events.push(OrderEvent::TrailingStopMoved {
                    order_id: id,
                    trigger_price: trigger,
                });
            }
        }

        if !is_triggered(order, price) {
            return;
        }

        self.transition(id, OrderStatus::Triggered, "triggered");
        debug!(order_id = %id, %price, "order triggered");
        events.push(OrderEvent::Triggered {
            order_id: id,
            price,
        });

        let result = match self.orders.get(&id) {
            Some(order) => gateway.execute(order, price),
            None => return,
        };
        match result {
            Ok(fill) if fill.price > Decimal::ZERO && fill.size > Decimal::ZERO => {
                self.record_fill(id, fill, events)
            }
            Ok(_) => self.record_rejection(id, RejectionReason::InvalidAmount, events),
            Err(reason) => self.record_rejection(id, reason, events),
        }
    }

    fn record_fill(&mut self, id: OrderId, fill: Fill, events: &mut Vec<OrderEvent>) {
        let (position_id, realized, applied) = match self.settle(id, fill) {
            Ok(settled) => settled,
            Err(reason) => {
                error!(order_id = %id, %reason, "fill could not be applied to its position");
                self.record_rejection(id, RejectionReason::InvalidAmount, events);
                return;
            }
        };

        let fill = Fill::new(fill.price, applied);
        self.transition(id, OrderStatus::Filled, "filled");
        if self.queued_cancels.remove(&id) {
            debug!(order_id = %id, "queued cancel dropped: order filled");
        }
        let group_id = match self.orders.get_mut(&id) {
            Some(order) => {
                order.fill = Some(fill);
                order.position_id = Some(position_id);
                order.group_id
            }
            None => None,
        };
        info!(
            order_id = %id,
            price = %fill.price,
            size = %fill.size,
            %position_id,
            %realized,
            "order filled"
        );
        events.push(OrderEvent::Filled {
            order_id: id,
            fill,
            position_id,
            realized_pnl: realized,
        });

        if let Some(group_id) = group_id {
            self.cancel_group_siblings(group_id, id, events);
        }

        self.activate_bracket_legs(id, position_id, fill.price, events);

        let closed = self
            .positions
            .get(&position_id)
            .filter(|p| !p.is_open())
            .map(|p| p.realized_pnl);
        if let Some(realized_pnl) = closed {
            info!(%position_id, %realized_pnl, "position closed");
            events.push(OrderEvent::PositionClosed {
                position_id,
                realized_pnl,
            });
            self.cancel_position_orders(position_id, events);
        }
    }

    /// Apply a fill to the order's position, opening one if needed.
    ///
    /// Returns the position, the realized P&L and the size actually applied.
    fn settle(
        &mut self,
        id: OrderId,
        fill: Fill,
    ) -> Result<(PositionId, Decimal, Decimal), String> {
        let order = self
            .orders
            .get(&id)
            .ok_or_else(|| format!("order {id} vanished"))?;
        let (side, intent, position_id) = (order.side, order.intent, order.position_id);

        match (intent, position_id) {
            (Intent::Open, None) => {
                let pid = self.alloc_position_id();
                self.positions
                    .insert(pid, Position::new(pid, side, fill.price, fill.size));
                info!(position_id = %pid, %side, entry_price = %fill.price, size = %fill.size, "position opened");
                Ok((pid, Decimal::ZERO, fill.size))
            }
            (Intent::Open, Some(pid)) => {
                let position = self
                    .positions
                    .get_mut(&pid)
                    .ok_or_else(|| format!("position {pid} not found"))?;
                let realized = position
                    .apply_fill(side, fill.price, fill.size, true)
                    .map_err(|e| e.to_string())?;
                Ok((pid, realized, fill.size))
            }
            (Intent::Close, Some(pid)) => {
                let position = self
                    .positions
                    .get_mut(&pid)
                    .ok_or_else(|| format!("position {pid} not found"))?;
                // Another closing order may have shrunk the position since placement
                let size = fill.size.min(position.size);
                let realized = position
                    .apply_fill(side, fill.price, size, false)
                    .map_err(|e| e.to_string())?;
                Ok((pid, realized, size))
            }
            (Intent::Close, None) => Err("closing order has no position".to_string()),
        }
    }

    /// Record a failed execution. A cancel queued while the order was in
    /// flight takes effect here: the order ends Cancelled, keeping the
    /// venue's reason in `rejection`.
    fn record_rejection(
        &mut self,
        id: OrderId,
        reason: RejectionReason,
        events: &mut Vec<OrderEvent>,
    ) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.rejection = Some(reason);
        }
        if self.queued_cancels.contains(&id) {
            warn!(order_id = %id, %reason, "execution failed, applying queued cancel");
            self.cancel_internal(id, CancelReason::User, events);
        } else {
            self.transition(id, OrderStatus::Rejected, &reason.to_string());
            warn!(order_id = %id, %reason, "order rejected");
            events.push(OrderEvent::Rejected {
                order_id: id,
                reason,
            });
        }

        // A bracket entry that will never fill strands its legs
        if let Some(legs) = self.dormant.remove(&id) {
            for leg in legs {
                self.cancel_internal(leg, CancelReason::BracketEntryCancelled, events);
            }
        }
    }

    // ── Cancellation ───────────────────────────────────────────────────

    /// Cancel a single order. Group siblings are left alone.
    ///
    /// Cancelling a bracket entry also cancels its dormant legs, which could
    /// never activate otherwise. A cancel aimed at an order that is mid
    /// execution is queued: it is dropped if the order fills and applied if
    /// execution fails.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<(), OrderError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if order.is_terminal() {
            return Err(OrderError::AlreadyTerminal(order_id, order.status));
        }
        if order.status == OrderStatus::Triggered {
            debug!(%order_id, "cancel queued behind execution");
            self.queued_cancels.insert(order_id);
            return Ok(());
        }

        let mut events = Vec::new();
        self.cancel_internal(order_id, CancelReason::User, &mut events);
        if let Some(legs) = self.dormant.remove(&order_id) {
            for leg in legs {
                self.cancel_internal(leg, CancelReason::BracketEntryCancelled, &mut events);
            }
        }
        Ok(())
    }

    fn cancel_internal(&mut self, id: OrderId, reason: CancelReason, events: &mut Vec<OrderEvent>) {
        let active = self.orders.get(&id).is_some_and(|o| o.is_active());
        if !active {
            return;
        }
        self.transition(id, OrderStatus::Cancelled, &reason.to_string());
        for legs in self.dormant.values_mut() {
            legs.retain(|leg| *leg != id);
        }
        self.queued_cancels.remove(&id);
        info!(order_id = %id, %reason, "order cancelled");
        events.push(OrderEvent::Cancelled {
            order_id: id,
            reason,
        });
    }

    /// OCO: when one member fills, cancel every other live member.
    fn cancel_group_siblings(
        &mut self,
        group_id: GroupId,
        filled_id: OrderId,
        events: &mut Vec<OrderEvent>,
    ) {
        let siblings: Vec<OrderId> = match self.groups.get(&group_id) {
            Some(group) => group
                .member_order_ids
                .iter()
                .copied()
                .filter(|&id| id != filled_id)
                .collect(),
            None => return,
        };
        for sibling in siblings {
            self.cancel_internal(sibling, CancelReason::GroupSiblingFilled, events);
        }
    }

    /// Cancel every live order still referencing a closed position.
    fn cancel_position_orders(&mut self, position_id: PositionId, events: &mut Vec<OrderEvent>) {
        let stale: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_active() && o.position_id == Some(position_id))
            .map(|o| o.id)
            .collect();
        for id in stale {
            self.cancel_internal(id, CancelReason::PositionClosed, events);
        }
    }

    /// Attach a filled entry's legs to its position and start their trackers.
    fn activate_bracket_legs(
        &mut self,
        entry_id: OrderId,
        position_id: PositionId,
        entry_price: Decimal,
        events: &mut Vec<OrderEvent>,
    ) {
        let Some(legs) = self.dormant.remove(&entry_id) else {
            return;
        };
        for leg_id in legs {
            let Some(leg) = self.orders.get_mut(&leg_id) else {
                continue;
            };
            if !leg.is_active() {
                continue;
            }
            leg.position_id = Some(position_id);
            if let Some(tracker) = leg.trailing.as_mut() {
                tracker.activate(entry_price);
            }
            sync_trailing_trigger(leg);
            debug!(order_id = %leg_id, %position_id, "bracket leg activated");
            self.record_audit(
                leg_id,
                OrderStatus::Pending,
                OrderStatus::Pending,
                "bracket entry filled, leg activated",
            );
            events.push(OrderEvent::BracketLegActivated {
                order_id: leg_id,
                position_id,
            });
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// All retained orders in ascending id order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Pending or Triggered orders in ascending id order.
    pub fn active_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_active()).collect()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().filter(|p| p.is_open()).collect()
    }

    pub fn group(&self, id: GroupId) -> Option<&OrderGroup> {
        self.groups.get(&id)
    }

    /// Other members of the order's group (empty if ungrouped).
    pub fn linked_order_ids(&self, id: OrderId) -> Vec<OrderId> {
        self.orders
            .get(&id)
            .and_then(|o| o.group_id)
            .and_then(|g| self.groups.get(&g))
            .map(|g| {
                g.member_order_ids
                    .iter()
                    .copied()
                    .filter(|&m| m != id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether an order is a bracket leg still waiting for its entry.
    pub fn is_dormant(&self, id: OrderId) -> bool {
        self.dormant.values().any(|legs| legs.contains(&id))
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    pub fn ticks_processed(&self) -> u64 {
        self.tick
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    /// Remove terminal orders the caller has finished with.
    ///
    /// A terminal order stays while any other member of its group is still
    /// live, so group membership never points at a missing order. Groups with
    /// no remaining members are dropped too.
    pub fn purge_terminal(&mut self) -> Vec<Order> {
        let live_groups: BTreeSet<GroupId> = self
            .orders
            .values()
            .filter(|o| o.is_active())
            .filter_map(|o| o.group_id)
            .collect();
        let purge: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_terminal())
            .filter(|o| o.group_id.map_or(true, |g| !live_groups.contains(&g)))
            .map(|o| o.id)
            .collect();

        let purged: Vec<Order> = purge
            .iter()
            .filter_map(|id| self.orders.remove(id))
            .collect();
        for group in self.groups.values_mut() {
            group.member_order_ids.retain(|id| !purge.contains(id));
        }
        self.groups.retain(|_, g| !g.member_order_ids.is_empty());
        debug!(count = purged.len(), "terminal orders purged");
        purged
    }

    /// End the session: cancel everything still live and hand back the state.
    pub fn teardown(mut self) -> SessionReport {
        let live: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_active())
            .map(|o| o.id)
            .collect();
        let mut events = Vec::new();
        for id in live {
            self.cancel_internal(id, CancelReason::SessionClosed, &mut events);
        }
        self.dormant.clear();
        info!(
            instrument = %self.instrument,
            ticks = self.tick,
            cancelled = events.len(),
            "registry torn down"
        );

        SessionReport {
            instrument: self.instrument,
            ticks_processed: self.tick,
            last_price: self.last_price,
            orders: self.orders.into_values().collect(),
            positions: self.positions.into_values().collect(),
            groups: self.groups.into_values().collect(),
            audit_trail: self.audit_trail,
        }
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn validate(&self, spec: &OrderSpec) -> Result<(), OrderError> {
        if spec.size <= Decimal::ZERO {
            return Err(invalid(format!("size must be positive, got {}", spec.size)));
        }

        if spec.kind == OrderKind::TrailingStop {
            let pct = spec
                .trail_percent
                .ok_or_else(|| invalid("trailing stop requires trail_percent"))?;
            validate_trail_percent(pct)?;
            if spec.trigger_price.is_some() {
                return Err(invalid("trailing stop derives its trigger; trigger_price not allowed"));
            }
        } else {
            if spec.trail_percent.is_some() {
                return Err(invalid(format!("trail_percent only applies to trailing stops, not {:?}", spec.kind)));
            }
            match spec.trigger_price {
                Some(p) if p > Decimal::ZERO => {}
                Some(p) => return Err(invalid(format!("trigger price must be positive, got {p}"))),
                None => return Err(invalid(format!("{:?} requires a trigger price", spec.kind))),
            }
        }

        if spec.kind.is_protective() && spec.intent != Intent::Close {
            return Err(invalid(format!("{:?} can only close exposure", spec.kind)));
        }

        match spec.position_id {
            None if spec.intent == Intent::Close => {
                Err(invalid("closing order must reference a position"))
            }
            None => Ok(()),
            Some(pid) => {
                let position = self
                    .positions
                    .get(&pid)
                    .ok_or_else(|| invalid(format!("unknown position {pid}")))?;
                if !position.is_open() {
                    return Err(invalid(format!("position {pid} is closed")));
                }
                if position.side != spec.side {
                    return Err(invalid(format!(
                        "order side {} contradicts {} position {pid}",
                        spec.side, position.side
                    )));
                }
                if spec.intent == Intent::Close && spec.size > position.size {
                    return Err(invalid(format!(
                        "closing size {} exceeds position size {}",
                        spec.size, position.size
                    )));
                }
                Ok(())
            }
        }
    }

    fn plan_group(&self, linked: &[OrderId]) -> Result<GroupPlan, OrderError> {
        if linked.is_empty() {
            return Ok(GroupPlan::None);
        }

        let mut members: Vec<OrderId> = Vec::with_capacity(linked.len());
        for id in linked {
            if !members.contains(id) {
                members.push(*id);
            }
        }

        let mut groups = BTreeSet::new();
        let mut ungrouped = false;
        for id in &members {
            let order = self
                .orders
                .get(id)
                .ok_or_else(|| invalid(format!("linked order {id} not found")))?;
            if order.is_terminal() {
                return Err(invalid(format!("linked order {id} is already {}", order.status)));
            }
            match order.group_id {
                Some(g) => {
                    groups.insert(g);
                }
                None => ungrouped = true,
            }
        }

        match (groups.len(), ungrouped) {
            (0, _) => Ok(GroupPlan::New(members)),
            (1, false) => Ok(groups
                .into_iter()
                .next()
                .map_or(GroupPlan::New(members), GroupPlan::Join)),
            _ => Err(invalid("linked orders must share a single group")),
        }
    }

    fn new_order(&self, id: OrderId, spec: &OrderSpec) -> Order {
        let trailing = match (spec.kind, spec.trail_percent) {
            (OrderKind::TrailingStop, Some(pct)) => Some(TrailingStopTracker::new(spec.side, pct)),
            _ => None,
        };
        Order {
            id,
            kind: spec.kind,
            side: spec.side,
            intent: spec.intent,
            size: spec.size,
            trigger_price: spec.trigger_price,
            trailing,
            position_id: spec.position_id,
            group_id: None,
            parent_id: None,
            status: OrderStatus::Pending,
            fill: None,
            rejection: None,
            created_tick: self.tick,
            closed_tick: None,
        }
    }

    fn transition(&mut self, id: OrderId, to: OrderStatus, reason: &str) {
        let tick = self.tick;
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        let from = order.status;
        order.status = to;
        if to.is_terminal() {
            order.closed_tick = Some(tick);
        }
        self.record_audit(id, from, to, reason);
    }

    fn record_audit(&mut self, order_id: OrderId, from: OrderStatus, to: OrderStatus, reason: &str) {
        self.audit_trail.push(OrderAuditEntry {
            order_id,
            tick: self.tick,
            from_status: from,
            to_status: to,
            reason: reason.to_string(),
        });
    }

    fn alloc_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn alloc_position_id(&mut self) -> PositionId {
        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        id
    }

    fn alloc_group_id(&mut self) -> GroupId {
        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        id
    }
}

fn validate_trail_percent(pct: Decimal) -> Result<(), OrderError> {
    if pct < Decimal::ZERO || pct >= Decimal::ONE {
        return Err(invalid(format!("trail_percent must be in [0, 1), got {pct}")));
    }
    Ok(())
}

/// Mirror a trailing tracker's trigger onto the order.
fn sync_trailing_trigger(order: &mut Order) {
    if let Some(tracker) = &order.trailing {
        order.trigger_price = tracker.trigger_price();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionResult;
    use crate::gateway::ImmediateFill;
    use rust_decimal_macros::dec;

    // ── Test helpers ───────────────────────────────────────────────────

    fn tick(price: Decimal) -> PriceTick {
        PriceTick::now("SOL", price)
    }

    fn registry() -> OrderRegistry {
        OrderRegistry::new("SOL")
    }

    #[test]
    fn place_assigns_ascending_ids_and_pending() {
        let mut reg = registry();
        let a = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(99), dec!(1)))
            .unwrap();
        let b = reg
            .place(OrderSpec::limit(Side::Short, Intent::Open, dec!(105), dec!(1)))
            .unwrap();
        assert!(a.id < b.id);
        assert_eq!(a.status, OrderStatus::Pending);
        assert_eq!(reg.active_orders().len(), 2);
    }

    #[test]
    fn invalid_placements_rejected() {
        let mut reg = registry();
        let pid = reg.open_position(Side::Long, dec!(100), dec!(2)).unwrap();

        let cases = vec![
            OrderSpec::limit(Side::Long, Intent::Open, dec!(99), dec!(0)),
            OrderSpec::limit(Side::Long, Intent::Open, dec!(-1), dec!(1)),
            OrderSpec::trailing_stop(Side::Long, dec!(1.2), dec!(1)).on_position(pid),
            OrderSpec::trailing_stop(Side::Long, dec!(1), dec!(1)).on_position(pid),
            OrderSpec::trailing_stop(Side::Long, dec!(-0.1), dec!(1)).on_position(pid),
            OrderSpec::stop(Side::Long, dec!(95), dec!(1)),
            OrderSpec::stop(Side::Short, dec!(105), dec!(1)).on_position(pid),
            OrderSpec::stop(Side::Long, dec!(95), dec!(3)).on_position(pid),
            OrderSpec::stop(Side::Long, dec!(95), dec!(1)).on_position(PositionId(99)),
        ];
        for spec in cases {
            let err = reg.place(spec.clone()).unwrap_err();
            assert!(
                matches!(err, OrderError::InvalidOrder(_)),
                "expected InvalidOrder for {spec:?}, got {err:?}"
            );
        }
        assert!(reg.active_orders().is_empty());
    }

    #[test]
    fn zero_trail_percent_is_valid() {
        let mut reg = registry();
        let pid = reg.open_position(Side::Long, dec!(100), dec!(1)).unwrap();
        let order = reg
            .place(OrderSpec::trailing_stop(Side::Long, Decimal::ZERO, dec!(1)).on_position(pid))
            .unwrap();
        assert_eq!(order.trigger_price, Some(dec!(100)));
    }

    #[test]
    fn trailing_stop_scenario_from_position_at_100() {
        let mut reg = registry();
        let pid = reg.open_position(Side::Long, dec!(100), dec!(1)).unwrap();
        let ts = reg
            .place(OrderSpec::trailing_stop(Side::Long, dec!(0.05), dec!(1)).on_position(pid))
            .unwrap();
        assert_eq!(ts.high_water(), Some(dec!(100)));
        assert_eq!(ts.trigger_price, Some(dec!(95)));

        let mut gw = ImmediateFill;
        for p in [dec!(100), dec!(110), dec!(105)] {
            reg.on_price_tick(&tick(p), &mut gw);
        }
        let order = reg.get(ts.id).unwrap();
        assert_eq!(order.high_water(), Some(dec!(110)));
        assert_eq!(order.trigger_price, Some(dec!(104.5)));
        assert_eq!(order.status, OrderStatus::Pending);

        let events = reg.on_price_tick(&tick(dec!(104)), &mut gw);
        assert_eq!(reg.get(ts.id).unwrap().status, OrderStatus::Filled);
        assert!(events.iter().any(|e| matches!(
            e,
            OrderEvent::PositionClosed { realized_pnl, .. } if *realized_pnl == dec!(4)
        )));
        assert!(!reg.position(pid).unwrap().is_open());
    }

    #[test]
    fn oco_fill_cancels_sibling_same_tick() {
        let mut reg = registry();
        let pid = reg.open_position(Side::Long, dec!(100), dec!(1)).unwrap();
        let stop = reg
            .place(OrderSpec::stop(Side::Long, dec!(95), dec!(1)).on_position(pid))
            .unwrap();
        let target = reg
            .place(
                OrderSpec::oco_leg(Side::Long, Intent::Close, dec!(110), dec!(1))
                    .on_position(pid)
                    .linked_to([stop.id]),
            )
            .unwrap();
        assert_eq!(reg.linked_order_ids(stop.id), vec![target.id]);
        assert_eq!(reg.linked_order_ids(target.id), vec![stop.id]);

        let events = reg.on_price_tick(&tick(dec!(111)), &mut ImmediateFill);
        assert_eq!(reg.get(target.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(reg.get(stop.id).unwrap().status, OrderStatus::Cancelled);
        assert!(events.contains(&OrderEvent::Cancelled {
            order_id: stop.id,
            reason: CancelReason::GroupSiblingFilled,
        }));
    }

    #[test]
    fn cascade_precedes_later_eligible_sibling() {
        // Two opening buys linked as OCO, both eligible on the same tick:
        // the lower id fills, the higher id is cancelled before evaluation.
        let mut reg = registry();
        let a = reg
            .place(OrderSpec::oco_leg(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        let b = reg
            .place(
                OrderSpec::oco_leg(Side::Long, Intent::Open, dec!(101), dec!(1)).linked_to([a.id]),
            )
            .unwrap();

        let mut calls = 0;
        let mut gw = |order: &Order, price: Decimal| -> ExecutionResult {
            calls += 1;
            Ok(Fill::new(price, order.size))
        };
        reg.on_price_tick(&tick(dec!(99)), &mut gw);
        assert_eq!(calls, 1);
        assert_eq!(reg.get(a.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(reg.get(b.id).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn cancel_errors() {
        let mut reg = registry();
        assert_eq!(
            reg.cancel(OrderId(42)).unwrap_err(),
            OrderError::OrderNotFound(OrderId(42))
        );

        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        reg.on_price_tick(&tick(dec!(99)), &mut ImmediateFill);
        let before = reg.get(o.id).unwrap().clone();

        assert_eq!(
            reg.cancel(o.id).unwrap_err(),
            OrderError::AlreadyTerminal(o.id, OrderStatus::Filled)
        );
        assert_eq!(reg.get(o.id).unwrap(), &before);
    }

    #[test]
    fn single_cancel_leaves_siblings() {
        let mut reg = registry();
        let a = reg
            .place(OrderSpec::oco_leg(Side::Long, Intent::Open, dec!(95), dec!(1)))
            .unwrap();
        let b = reg
            .place(OrderSpec::oco_leg(Side::Short, Intent::Open, dec!(105), dec!(1)).linked_to([a.id]))
            .unwrap();
        reg.cancel(a.id).unwrap();
        assert_eq!(reg.get(a.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(reg.get(b.id).unwrap().status, OrderStatus::Pending);
    }

    /// Helper: place an opening limit and pin it mid-execution.
    fn triggered_limit(reg: &mut OrderRegistry) -> OrderId {
        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        reg.transition(o.id, OrderStatus::Triggered, "triggered");
        o.id
    }

    #[test]
    fn queued_cancel_applies_when_execution_fails() {
        let mut reg = registry();
        let id = triggered_limit(&mut reg);

        reg.cancel(id).unwrap();
        assert!(reg.queued_cancels.contains(&id));
        assert_eq!(reg.get(id).unwrap().status, OrderStatus::Triggered);

        let mut events = Vec::new();
        reg.record_rejection(id, RejectionReason::SlippageExceeded, &mut events);
        let order = reg.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.rejection, Some(RejectionReason::SlippageExceeded));
        assert_eq!(
            events,
            vec![OrderEvent::Cancelled {
                order_id: id,
                reason: CancelReason::User,
            }]
        );
        assert!(reg.queued_cancels.is_empty());
    }

    #[test]
    fn queued_cancel_dropped_when_order_fills() {
        let mut reg = registry();
        let id = triggered_limit(&mut reg);
        reg.cancel(id).unwrap();

        let mut events = Vec::new();
        reg.record_fill(id, Fill::new(dec!(99), dec!(1)), &mut events);
        assert_eq!(reg.get(id).unwrap().status, OrderStatus::Filled);
        assert!(reg.queued_cancels.is_empty());
        assert_eq!(reg.open_positions().len(), 1);
    }

    #[test]
    fn rejection_is_recorded_not_raised() {
        let mut reg = registry();
        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        let mut gw = |_: &Order, _: Decimal| -> ExecutionResult {
            Err(RejectionReason::InsufficientLiquidity)
        };
        let events = reg.on_price_tick(&tick(dec!(90)), &mut gw);
        assert_eq!(
            events,
            vec![
                OrderEvent::Triggered {
                    order_id: o.id,
                    price: dec!(90)
                },
                OrderEvent::Rejected {
                    order_id: o.id,
                    reason: RejectionReason::InsufficientLiquidity
                },
            ]
        );
        let order = reg.get(o.id).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.rejection, Some(RejectionReason::InsufficientLiquidity));
        assert!(reg.positions().next().is_none());
    }

    #[test]
    fn zero_size_fill_is_invalid_amount() {
        let mut reg = registry();
        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        let mut gw =
            |_: &Order, price: Decimal| -> ExecutionResult { Ok(Fill::new(price, Decimal::ZERO)) };
        reg.on_price_tick(&tick(dec!(100)), &mut gw);
        assert_eq!(
            reg.get(o.id).unwrap().rejection,
            Some(RejectionReason::InvalidAmount)
        );
    }

    #[test]
    fn other_instrument_and_bad_prices_ignored() {
        let mut reg = registry();
        reg.place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        assert!(reg
            .on_price_tick(&PriceTick::now("BTC", dec!(1)), &mut ImmediateFill)
            .is_empty());
        assert!(reg.on_price_tick(&tick(dec!(0)), &mut ImmediateFill).is_empty());
        assert_eq!(reg.ticks_processed(), 0);
        assert_eq!(reg.active_orders().len(), 1);
    }

    #[test]
    fn bracket_legs_dormant_until_entry_fills() {
        let mut reg = registry();
        let bracket = reg
            .place_bracket(BracketSpec {
                side: Side::Long,
                size: dec!(2),
                entry_price: dec!(100),
                stop_price: dec!(95),
                target_price: dec!(110),
                trail_percent: None,
            })
            .unwrap();
        assert_eq!(bracket.risk.ratio, dec!(2));
        assert!(reg.is_dormant(bracket.stop_id));
        assert!(reg.is_dormant(bracket.target_id));

        // Below the stop, but the legs are dormant and the entry is a buy at 100
        let events = reg.on_price_tick(&tick(dec!(94)), &mut ImmediateFill);
        assert_eq!(reg.get(bracket.entry_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(reg.get(bracket.stop_id).unwrap().status, OrderStatus::Pending);
        assert!(events.iter().any(|e| matches!(
            e,
            OrderEvent::BracketLegActivated { order_id, .. } if *order_id == bracket.stop_id
        )));

        // Next tick the stop is live
        reg.on_price_tick(&tick(dec!(94)), &mut ImmediateFill);
        assert_eq!(reg.get(bracket.stop_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(reg.get(bracket.target_id).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn cancelling_bracket_entry_cancels_dormant_legs() {
        let mut reg = registry();
        let bracket = reg
            .place_bracket(BracketSpec {
                side: Side::Short,
                size: dec!(1),
                entry_price: dec!(100),
                stop_price: dec!(105),
                target_price: dec!(90),
                trail_percent: None,
            })
            .unwrap();
        reg.cancel(bracket.entry_id).unwrap();
        for id in [bracket.entry_id, bracket.stop_id, bracket.target_id] {
            assert_eq!(reg.get(id).unwrap().status, OrderStatus::Cancelled);
        }
        assert!(!reg.is_dormant(bracket.stop_id));
    }

    #[test]
    fn invalid_bracket_wraps_risk_error() {
        let mut reg = registry();
        let err = reg
            .place_bracket(BracketSpec {
                side: Side::Long,
                size: dec!(1),
                entry_price: dec!(100),
                stop_price: dec!(100),
                target_price: dec!(110),
                trail_percent: None,
            })
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidBracket(RiskError::DivisionByZeroRisk(dec!(100)))
        );
        assert_eq!(reg.orders().count(), 0);
    }

    #[test]
    fn bracket_with_non_positive_level_is_invalid_order() {
        let mut reg = registry();
        let cases = [
            (Side::Long, dec!(100), dec!(-5), dec!(110)),
            (Side::Long, dec!(100), dec!(0), dec!(110)),
            (Side::Short, dec!(100), dec!(105), dec!(0)),
            (Side::Short, dec!(-1), dec!(105), dec!(-10)),
        ];
        for (side, entry_price, stop_price, target_price) in cases {
            let err = reg
                .place_bracket(BracketSpec {
                    side,
                    size: dec!(1),
                    entry_price,
                    stop_price,
                    target_price,
                    trail_percent: None,
                })
                .unwrap_err();
            assert!(
                matches!(err, OrderError::InvalidOrder(_)),
                "{side} {entry_price}/{stop_price}/{target_price}: {err:?}"
            );
        }
        assert_eq!(reg.orders().count(), 0);
        assert!(reg.group(GroupId(1)).is_none());
    }

    #[test]
    fn overflowing_fill_is_rejected_not_panicking() {
        let mut reg = registry();
        let pid = reg.open_position(Side::Long, dec!(100), dec!(1)).unwrap();
        let add = reg
            .place(
                OrderSpec::limit(Side::Long, Intent::Open, Decimal::MAX, dec!(1)).on_position(pid),
            )
            .unwrap();

        let events = reg.on_price_tick(&tick(Decimal::MAX), &mut ImmediateFill);
        assert!(events.contains(&OrderEvent::Rejected {
            order_id: add.id,
            reason: RejectionReason::InvalidAmount,
        }));
        assert_eq!(reg.get(add.id).unwrap().status, OrderStatus::Rejected);
        let position = reg.position(pid).unwrap();
        assert_eq!(position.size, dec!(1));
        assert_eq!(position.entry_price, dec!(100));

        // The session carries on
        reg.on_price_tick(&tick(dec!(100)), &mut ImmediateFill);
        assert_eq!(reg.ticks_processed(), 2);
    }

    #[test]
    fn purge_keeps_terminal_members_of_live_groups() {
        let mut reg = registry();
        let a = reg
            .place(OrderSpec::oco_leg(Side::Long, Intent::Open, dec!(95), dec!(1)))
            .unwrap();
        let b = reg
            .place(OrderSpec::oco_leg(Side::Short, Intent::Open, dec!(105), dec!(1)).linked_to([a.id]))
            .unwrap();
        let lone = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(50), dec!(1)))
            .unwrap();
        reg.cancel(a.id).unwrap();
        reg.cancel(lone.id).unwrap();

        let purged = reg.purge_terminal();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, lone.id);
        assert!(reg.get(a.id).is_some());

        reg.cancel(b.id).unwrap();
        let purged = reg.purge_terminal();
        assert_eq!(purged.len(), 2);
        assert!(reg.get(a.id).is_none());
        assert!(reg.group(GroupId(1)).is_none());
    }

    #[test]
    fn teardown_cancels_live_orders() {
        let mut reg = registry();
        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(90), dec!(1)))
            .unwrap();
        reg.on_price_tick(&tick(dec!(100)), &mut ImmediateFill);
        let report = reg.teardown();
        assert_eq!(report.ticks_processed, 1);
        assert_eq!(report.last_price, Some(dec!(100)));
        let order = report.orders.iter().find(|x| x.id == o.id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(
            report.audit_trail.last().unwrap().reason,
            CancelReason::SessionClosed.to_string()
        );
    }

    #[test]
    fn audit_trail_records_each_transition() {
        let mut reg = registry();
        let o = reg
            .place(OrderSpec::limit(Side::Long, Intent::Open, dec!(100), dec!(1)))
            .unwrap();
        reg.on_price_tick(&tick(dec!(100)), &mut ImmediateFill);
        let trail: Vec<(OrderStatus, OrderStatus)> = reg
            .audit_trail()
            .iter()
            .filter(|e| e.order_id == o.id)
            .map(|e| (e.from_status, e.to_status))
            .collect();
        assert_eq!(
            trail,
            vec![
                (OrderStatus::Pending, OrderStatus::Pending),
                (OrderStatus::Pending, OrderStatus::Triggered),
                (OrderStatus::Triggered, OrderStatus::Filled),
            ]
        );
        assert_eq!(reg.get(o.id).unwrap().closed_tick, Some(1));
    }
}
