use chrono::{Duration, NaiveDateTime};
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::Rng;

use super::pick;
use crate::app_config::ChannelTable;
use crate::data::model::{Channel, Country, User, Users};

pub struct UserSynthesizer {
    channels: WeightedIndex<f64>,
}

impl UserSynthesizer {
    pub fn new(weights: &ChannelTable<f64>) -> Result<Self, WeightedError> {
        let channels = WeightedIndex::new(Channel::ALL.iter().map(|c| *weights.get(*c)))?;
        Ok(Self { channels })
    }

    /// Users get sequential ids from `start_id` and sign up at most
    /// `lookback_days` days, 23 hours and 59 minutes before `now`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        start_id: i64,
        lookback_days: u32,
        now: NaiveDateTime,
    ) -> Users {
        let mut users = Vec::with_capacity(count);
        for i in 0..count {
            let user_id = start_id + i as i64;
            let created_at = now
                - Duration::days(rng.gen_range(0..=i64::from(lookback_days)))
                - Duration::hours(rng.gen_range(0..=23))
                - Duration::minutes(rng.gen_range(0..=59));
            let country = pick(rng, &Country::ALL);
            let acquisition_channel = Channel::ALL[self.channels.sample(rng)];
            users.push(User {
                user_id,
                created_at,
                country,
                acquisition_channel,
            });
        }
        users
    }
}
