// Leaf components
pub mod payment_instructions;
pub mod pricing;
pub mod reference_code;

// Order assembly and lifecycle
pub mod checkout;
pub mod order_status;
pub mod orders;

// Cart management
pub mod carts;
