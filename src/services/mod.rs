// Catalog reads
pub mod catalog;

// Pricing rules (discounts, subtotals, shipping)
pub mod pricing;

// Cart repositories, cookie codec and login/logout merge
pub mod cart;

// Order placement and post-placement reads/edits
pub mod orders;

// Payment session workflow (both providers)
pub mod payments;

// Shopper accounts
pub mod users;
