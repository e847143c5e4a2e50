pub mod courier;
pub mod duty;
pub mod order;
pub mod stats;
pub mod withdrawal;
