pub mod cart_line;
pub mod destination;
pub mod order;
pub mod order_line;
pub mod user;
