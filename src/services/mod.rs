pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payment_gateway;
pub mod payment_webhook;
pub mod pricing;
pub mod shipping;
pub mod stock;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::{Actor, OrderLifecycleService};
pub use payment_gateway::{HttpPaymentGateway, PaymentGateway};
pub use payment_webhook::WebhookProcessor;
pub use shipping::ShippingRateTable;
pub use stock::StockLedger;
