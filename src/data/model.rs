use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

pub type Users = Vec<User>;
pub type Events = Vec<Event>;
pub type Orders = Vec<Order>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Tiktok,
    Instagram,
    Google,
    Referral,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Tiktok,
        Channel::Instagram,
        Channel::Google,
        Channel::Referral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Tiktok => "tiktok",
            Channel::Instagram => "instagram",
            Channel::Google => "google",
            Channel::Referral => "referral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Sg,
    My,
    Id,
    Ph,
    Th,
}

impl Country {
    pub const ALL: [Country; 5] = [
        Country::Sg,
        Country::My,
        Country::Id,
        Country::Ph,
        Country::Th,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Sg => "SG",
            Country::My => "MY",
            Country::Id => "ID",
            Country::Ph => "PH",
            Country::Th => "TH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Ios,
    Android,
    Web,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Ios, Device::Android, Device::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Ios => "ios",
            Device::Android => "android",
            Device::Web => "web",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    PageView,
    Search,
    Scroll,
    ViewProduct,
    AddToCart,
    Purchase,
}

impl EventName {
    /// Names drawn for plain browsing, outside the funnel.
    pub const BROWSING: [EventName; 3] = [EventName::PageView, EventName::Search, EventName::Scroll];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PageView => "page_view",
            EventName::Search => "search",
            EventName::Scroll => "scroll",
            EventName::ViewProduct => "view_product",
            EventName::AddToCart => "add_to_cart",
            EventName::Purchase => "purchase",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Page {
    #[serde(rename = "/home")]
    Home,
    #[serde(rename = "/search")]
    Search,
    #[serde(rename = "/product/111")]
    Product111,
    #[serde(rename = "/product/222")]
    Product222,
    #[serde(rename = "/product/333")]
    Product333,
    #[serde(rename = "/cart")]
    Cart,
    #[serde(rename = "/checkout")]
    Checkout,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Home,
        Page::Search,
        Page::Product111,
        Page::Product222,
        Page::Product333,
        Page::Cart,
        Page::Checkout,
    ];

    pub const PRODUCTS: [Page; 3] = [Page::Product111, Page::Product222, Page::Product333];

    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Home => "/home",
            Page::Search => "/search",
            Page::Product111 => "/product/111",
            Page::Product222 => "/product/222",
            Page::Product333 => "/product/333",
            Page::Cart => "/cart",
            Page::Checkout => "/checkout",
        }
    }
}

/// A persisted row, keyed by its primary key.
pub trait Row: Serialize + DeserializeOwned {
    const TABLE: &'static str;

    fn key(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub country: Country,
    pub acquisition_channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub user_id: i64,
    pub ts: NaiveDateTime,
    pub event_name: EventName,
    pub device: Device,
    pub page: Page,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub ts: NaiveDateTime,
    pub amount: f64,
}

impl Row for User {
    const TABLE: &'static str = "users";

    fn key(&self) -> i64 {
        self.user_id
    }
}

impl Row for Event {
    const TABLE: &'static str = "events";

    fn key(&self) -> i64 {
        self.event_id
    }
}

impl Row for Order {
    const TABLE: &'static str = "orders";

    fn key(&self) -> i64 {
        self.order_id
    }
}

/// Everything produced by one generation run, in emission order.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Batch {
    pub users: Users,
    pub events: Events,
    pub orders: Orders,
}

/// Rows actually inserted per table; conflicting rows are not counted.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub users: u64,
    pub events: u64,
    pub orders: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_as_str() {
        for page in Page::ALL {
            let json = serde_json::to_string(&page).unwrap();
            assert_eq!(json, format!("\"{}\"", page.as_str()));
        }
        for channel in Channel::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{}\"", channel.as_str()));
        }
        for country in Country::ALL {
            let json = serde_json::to_string(&country).unwrap();
            assert_eq!(json, format!("\"{}\"", country.as_str()));
        }
        assert_eq!(
            serde_json::to_string(&EventName::AddToCart).unwrap(),
            "\"add_to_cart\""
        );
    }

    #[test]
    fn test_row_keys() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let order = Order {
            order_id: 7,
            user_id: 3,
            ts,
            amount: 12.5,
        };
        assert_eq!(order.key(), 7);
        assert_eq!(Order::TABLE, "orders");
    }
}
