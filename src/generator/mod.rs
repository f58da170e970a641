//! Synthetic users, sessions, events and orders.
//!
//! Every draw goes through the caller's [`Rng`], so a seeded generator and a
//! fixed `now` reproduce a batch exactly.

use chrono::NaiveDateTime;
use log::debug;
use rand::Rng;

use crate::app_config::Settings;
use crate::data::model::{Batch, Device};

pub mod funnel;
pub mod ids;
pub mod sessions;
pub mod users;

use self::funnel::synthesize_session;
use self::ids::{IdBases, IdCursor};
use self::sessions::{schedule_sessions, Retention};
use self::users::UserSynthesizer;

pub(crate) fn pick<T: Copy, R: Rng + ?Sized>(rng: &mut R, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

pub fn generate<R: Rng + ?Sized>(
    settings: &Settings,
    bases: IdBases,
    rng: &mut R,
    now: NaiveDateTime,
) -> anyhow::Result<Batch> {
    let users = UserSynthesizer::new(&settings.channel_weights)?.generate(
        rng,
        settings.n_new_users,
        bases.user,
        settings.max_days_ago_signup,
        now,
    );

    let retention = Retention::from(settings);
    let mut cursor = IdCursor::new(bases);
    let mut events = Vec::new();
    let mut orders = Vec::new();
    let mut sessions = 0usize;

    for user in &users {
        let device = pick(rng, &Device::ALL);
        let funnel = settings.funnel.get(user.acquisition_channel);

        for start in schedule_sessions(rng, user.created_at, &retention) {
            let activity = synthesize_session(rng, user, device, start, now, funnel, &mut cursor);
            if !activity.events.is_empty() {
                sessions += 1;
            }
            events.extend(activity.events);
            orders.extend(activity.order);
        }
    }
    debug!(
        "generate: {} users, {} active sessions; next event id {}, next order id {}",
        users.len(),
        sessions,
        cursor.peek_event(),
        cursor.peek_order()
    );

    Ok(Batch {
        users,
        events,
        orders,
    })
}
