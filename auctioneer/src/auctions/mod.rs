#[allow(clippy::module_inception)]
mod auction;
pub use auction::{bid_scalar, lot_scalar, AssetAmounts, AuctionData, AuctionType};

mod valuation;
pub use valuation::{valuate, AuctionValue, ValuationContext};

mod fill_planner;
pub use fill_planner::{plan_fill, FillPlan, FillerState, PrimaryConfig, Request, RequestType, REQUEST_MAX};

mod liquidation_planner;
pub use liquidation_planner::{plan_bad_debt_auction, plan_liquidation_auction, AuctionProposal};
