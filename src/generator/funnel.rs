use std::ops::RangeInclusive;

use chrono::{Duration, NaiveDateTime};
use rand::Rng;

use super::ids::IdCursor;
use super::pick;
use crate::app_config::Funnel;
use crate::data::model::{Device, Event, EventName, Events, Order, Page, User};

/// Every event of a session lands before `start + SESSION_SPAN_MINUTES`.
pub const SESSION_SPAN_MINUTES: u32 = 26;

const BROWSING_EVENTS: RangeInclusive<usize> = 2..=8;
const BROWSING_MINUTES: RangeInclusive<i64> = 0..=25;
const VIEW_MINUTES: RangeInclusive<i64> = 0..=8;
const ADD_MINUTES: RangeInclusive<i64> = 5..=15;
const PURCHASE_MINUTES: RangeInclusive<i64> = 10..=25;
const MIN_AMOUNT: f64 = 8.0;
const MAX_AMOUNT: f64 = 80.0;

/// Funnel stages reached in one session. Later stages imply earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stages {
    pub viewed: bool,
    pub added: bool,
    pub purchased: bool,
}

impl Stages {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, funnel: &Funnel) -> Self {
        let viewed = rng.gen_bool(funnel.view);
        let added = viewed && rng.gen_bool(funnel.add);
        let purchased = added && rng.gen_bool(funnel.purchase);
        Self {
            viewed,
            added,
            purchased,
        }
    }
}

/// Rows produced by one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionActivity {
    pub events: Events,
    pub order: Option<Order>,
}

fn offset<R: Rng + ?Sized>(rng: &mut R, minutes: RangeInclusive<i64>) -> Duration {
    Duration::minutes(rng.gen_range(minutes)) + Duration::seconds(rng.gen_range(0..=59))
}

fn event(
    cursor: &mut IdCursor,
    user: &User,
    device: Device,
    ts: NaiveDateTime,
    event_name: EventName,
    page: Page,
) -> Event {
    Event {
        event_id: cursor.next_event(),
        user_id: user.user_id,
        ts,
        event_name,
        device,
        page,
    }
}

fn amount<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    (rng.gen_range(MIN_AMOUNT..=MAX_AMOUNT) * 100.0).round() / 100.0
}

/// Generates the events (and the order, on purchase) of one session.
///
/// Sessions starting after `now` produce nothing and consume no ids.
/// Browsing events come first in timestamp order, followed by the funnel
/// events; ids follow emission order.
pub fn synthesize_session<R: Rng + ?Sized>(
    rng: &mut R,
    user: &User,
    device: Device,
    start: NaiveDateTime,
    now: NaiveDateTime,
    funnel: &Funnel,
    cursor: &mut IdCursor,
) -> SessionActivity {
    if start > now {
        return SessionActivity::default();
    }

    let stages = Stages::draw(rng, funnel);

    let n_events = rng.gen_range(BROWSING_EVENTS);
    let mut timeline: Vec<NaiveDateTime> = (0..n_events)
        .map(|_| start + offset(rng, BROWSING_MINUTES))
        .collect();
    timeline.sort();

    let mut events = Vec::with_capacity(n_events + 3);
    for ts in timeline {
        let page = pick(rng, &Page::ALL);
        let event_name = pick(rng, &EventName::BROWSING);
        events.push(event(cursor, user, device, ts, event_name, page));
    }

    if stages.viewed {
        let ts = start + offset(rng, VIEW_MINUTES);
        let page = pick(rng, &Page::PRODUCTS);
        events.push(event(cursor, user, device, ts, EventName::ViewProduct, page));
    }

    if stages.added {
        let ts = start + offset(rng, ADD_MINUTES);
        events.push(event(cursor, user, device, ts, EventName::AddToCart, Page::Cart));
    }

    let mut order = None;
    if stages.purchased {
        let ts = start + offset(rng, PURCHASE_MINUTES);
        events.push(event(cursor, user, device, ts, EventName::Purchase, Page::Checkout));
        order = Some(Order {
            order_id: cursor.next_order(),
            user_id: user.user_id,
            ts,
            amount: amount(rng),
        });
    }

    SessionActivity { events, order }
}
