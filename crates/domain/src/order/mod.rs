//! Customer orders.

mod entity;
mod state;
mod value_objects;

pub use entity::Order;
pub use state::{CustomerStatus, OrderStatus};
pub use value_objects::{CustomerContact, Money, ShippingAddress, VendorOrderRef};
