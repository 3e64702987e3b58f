/********** Numbers **********/

/// Fixed-point scalar for 9 decimal numbers
pub const SCALAR_9: i128 = 1_000_000_000;

/// Fixed-point scalar for 7 decimal numbers
pub const SCALAR_7: i128 = 1_0000000;

/********** Auctions **********/

/// Number of blocks an auction runs for before the bid reaches zero
pub const AUCTION_DURATION_BLOCKS: u32 = 400;

/// Block delay at which both auction modifiers are at 100%
pub const AUCTION_NOMINAL_BLOCK: u32 = 200;

/// The per-block auction modifier step, 7 decimals (0.5% per block)
pub const PER_BLOCK_SCALAR: i128 = 0_0050000;

/// Dust offset added to repay amounts so a fill leaves no residual liability
pub const REPAY_DUST: i128 = 10;

/// A user is treated as liquidatable below this health factor
pub const LIQUIDATABLE_HF: f64 = 0.998;

/********** Retry budgets **********/

/// Retry budget for work-queue submissions (auction creation, bad debt transfer)
pub const WORK_SUBMISSION_RETRIES: u32 = 3;

/// Retry budget for bid submissions
pub const BID_SUBMISSION_RETRIES: u32 = 10;

/// Retry budget for unwind submissions
pub const UNWIND_SUBMISSION_RETRIES: u32 = 2;

/// Max attempts for a worker event before it is dead-lettered
pub const EVENT_MAX_RETRIES: u32 = 2;

/// Delay between event retry attempts
pub const EVENT_RETRY_DELAY_MS: u64 = 250;

/********** Timeouts **********/

/// Wall-clock budget for a single event handler invocation
pub const EVENT_TIMEOUT_SECS: u64 = 60;

/// Wall-clock budget for a single submission attempt
pub const SUBMISSION_TIMEOUT_SECS: u64 = 120;

/********** Collector cadences, in ledgers **********/

/// How often exchange price sources are polled
pub const PRICE_UPDATE_INTERVAL: u32 = 60;

/// How often the oracle history is refreshed and scanned
pub const ORACLE_SCAN_INTERVAL: u32 = 10;

/// How often a full liquidation scan runs
pub const LIQ_SCAN_INTERVAL: u32 = 1200;

/// How often stale users are refreshed
pub const USER_REFRESH_INTERVAL: u32 = 120;

/// Users not updated within this many ledgers are refreshed
pub const USER_STALE_LEDGERS: u32 = 1440;

/// Users not updated within this many ledgers are purged entirely
pub const USER_PURGE_LEDGERS: u32 = 120960;
