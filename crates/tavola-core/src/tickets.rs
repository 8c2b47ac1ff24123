//! # Kitchen / Bar Tickets
//!
//! Groups an order's lines by preparation station for the ticket printer.
//! Purely a read-side view: stations never influence status transitions.

use serde::Serialize;
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::order::OrderStatus;
use crate::types::{OrderDetail, Station};

/// One printed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TicketLine {
    pub item_id: String,
    pub name: String,
    pub quantity: i64,
    pub add_ons: Vec<String>,
}

/// Lines bound for one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub order_id: String,
    pub table_id: Option<String>,
    pub station: Station,
    pub lines: Vec<TicketLine>,
}

/// Builds one ticket per station, kitchen first. Cancelled lines are left out.
pub fn group_by_station(detail: &OrderDetail) -> Vec<Ticket> {
    let mut by_station: BTreeMap<Station, Vec<TicketLine>> = BTreeMap::new();

    for item in detail
        .items
        .iter()
        .filter(|i| i.status != OrderStatus::Cancelled)
    {
        by_station.entry(item.station).or_default().push(TicketLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            add_ons: item
                .add_ons
                .iter()
                .map(|a| format!("{} x{}", a.name, a.quantity))
                .collect(),
        });
    }

    by_station
        .into_iter()
        .map(|(station, lines)| Ticket {
            order_id: detail.order.id.clone(),
            table_id: detail.order.table_id.clone(),
            station,
            lines,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderType;
    use crate::types::{ItemTarget, Order, OrderItem, OrderItemAddOn};
    use chrono::Utc;

    fn item(id: &str, station: Station, status: OrderStatus) -> OrderItem {
        OrderItem {
            id: id.to_string(),
            order_id: "o1".to_string(),
            target: ItemTarget::Dish(format!("dish-{id}")),
            name: format!("Item {id}"),
            quantity: 1,
            unit_price_cents: 100,
            total_price_cents: 100,
            complimentary_quantity: 0,
            status,
            station,
            add_ons: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_group_by_station() {
        let now = Utc::now();
        let mut beer = item("3", Station::Bar, OrderStatus::Pending);
        beer.add_ons.push(OrderItemAddOn {
            id: "a1".into(),
            order_item_id: "3".into(),
            add_on_id: "lime".into(),
            name: "Lime".into(),
            unit_price_cents: 20,
            quantity: 2,
        });
        let detail = OrderDetail {
            order: Order {
                id: "o1".into(),
                store_id: "s1".into(),
                table_id: Some("t1".into()),
                session_id: Some("sess".into()),
                order_type: OrderType::DineIn,
                status: OrderStatus::Pending,
                total_cents: 300,
                customer_id: None,
                payment_id: None,
                payment_method: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![
                beer,
                item("1", Station::Kitchen, OrderStatus::Pending),
                item("2", Station::Kitchen, OrderStatus::Cancelled),
            ],
        };

        let tickets = group_by_station(&detail);
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].station, Station::Kitchen);
        assert_eq!(tickets[0].lines.len(), 1);
        assert_eq!(tickets[1].station, Station::Bar);
        assert_eq!(tickets[1].lines[0].add_ons, vec!["Lime x2".to_string()]);
    }
}
