//! Auction participation bot for a Blend-style lending protocol.
//!
//! The decision engine (valuation, fill planning, liquidation planning,
//! position management) is pure; everything that touches the chain, the
//! store, or the network sits behind the capability traits in
//! [`dependencies`].

pub mod auctions;
pub mod backstop;
pub mod bidder;
pub mod collector;
pub mod config;
pub mod constants;
pub mod dependencies;
pub mod errors;
pub mod events;
pub mod notifications;
pub mod oracle;
pub mod pool;
pub mod position_manager;
pub mod queue;
pub mod sources;
pub mod storage;
pub mod worker;

pub use auctions::{
    plan_bad_debt_auction, plan_fill, plan_liquidation_auction, valuate, AssetAmounts,
    AuctionData, AuctionProposal, AuctionType, AuctionValue, FillPlan, FillerState, PrimaryConfig,
    Request, RequestType, ValuationContext, REQUEST_MAX,
};
pub use config::{AppConfig, AuctionProfit, Filler};
pub use errors::{AuctioneerError, Result};
pub use oracle::{PoolOracle, PriceChanges, PriceHistory};
pub use pool::{Pool, PositionEstimate, Positions, Reserve};
pub use position_manager::manage_positions;
