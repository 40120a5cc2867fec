//! meridian-networking — broker REST/WebSocket transport and operator
//! notifications.

pub mod broker;
pub mod http;
pub mod mock;
pub mod notify;
pub mod websocket;

pub use broker::{
    Adjust, Broker, CandleBar, CandlePeriod, EstimateMaxPurchase, OrderHistoryRange, OrderType,
    OrderSubmitResult, Quote, SubmitOrderRequest, TimeInForce,
};
pub use http::HttpBroker;
pub use mock::MockBroker;
pub use notify::{Notifier, Severity, WebhookNotifier};
pub use websocket::WebSocketClient;
