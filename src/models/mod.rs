pub mod agent;
pub mod offer;
pub mod order;
pub mod zone;
