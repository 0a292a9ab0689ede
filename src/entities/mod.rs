pub mod cart_item;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod pack_variant;
pub mod payment;
pub mod product;
pub mod shipping_zone_rate;
pub mod stock_reservation;

pub use cart_item::Entity as CartItem;
pub use customer_address::Entity as CustomerAddress;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use pack_variant::Entity as PackVariant;
pub use payment::Entity as Payment;
pub use product::Entity as Product;
pub use shipping_zone_rate::Entity as ShippingZoneRate;
pub use stock_reservation::Entity as StockReservation;
