use thiserror::Error;

/// Contract error code returned by the pool when a requested liquidation
/// percent leaves the user too healthy.
pub const CONTRACT_LIQ_TOO_LARGE: u32 = 1213;

/// Contract error code returned by the pool when a requested liquidation
/// percent leaves the user too unhealthy.
pub const CONTRACT_LIQ_TOO_SMALL: u32 = 1214;

/// Error type for the bot. Groups follow the failure taxonomy the
/// orchestration layer acts on: transient RPC failures are retried, known
/// contract codes mutate the in-flight submission, data errors drop it, and
/// fatal errors surface to the process root.
#[derive(Debug, Error)]
pub enum AuctioneerError {
    // Transient failures
    #[error("rpc failure: {0}")]
    Rpc(String),
    #[error("timed out: {0}")]
    Timeout(String),

    // Contract errors
    #[error("contract error {0}")]
    Contract(u32),

    // Data errors
    #[error("missing oracle price for {0}")]
    MissingPrice(String),
    #[error("no reserve for {0}")]
    MissingReserve(String),
    #[error("unexpected asset {0} in auction")]
    UnexpectedAsset(String),
    #[error("no positions found for {0}")]
    MissingPositions(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // Planning infeasibility
    #[error("no feasible fill found")]
    InfeasibleFill,
    #[error("no valid liquidation found")]
    NoLiquidation,

    // Fatal
    #[error("pool validation failed: {0}")]
    PoolValidation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AuctioneerError {
    /// Whether the failure is worth retrying without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuctioneerError::Rpc(_) | AuctioneerError::Timeout(_) | AuctioneerError::Http(_)
        )
    }

    /// The contract error code, if this failure came back from the pool.
    pub fn contract_code(&self) -> Option<u32> {
        match self {
            AuctioneerError::Contract(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuctioneerError::PoolValidation(_))
    }
}

pub type Result<T> = std::result::Result<T, AuctioneerError>;
