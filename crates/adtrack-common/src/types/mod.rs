//! Core data types for the adtrack validator

mod aggregation;
mod campaign;
mod miner;
mod order;
mod visit;

pub use aggregation::{AggregatedData, AggregationQuery, AggregationSchema, MinersReputation};
pub use campaign::{Campaign, CampaignType};
pub use miner::{MinerAssignment, MinerPing};
pub use order::{
    Address, ClientInfo, CustomerInfo, OrderDetails, OrderHistoryEntry, OrderItem,
    OrderQueueItem, OrderQueueStatus, SaleAction, SaleEvent,
};
pub use visit::{
    BehaviorCounters, Device, IncomingVisit, SalesSnapshot, SalesStatus, VisitRecord, VisitSource,
};
