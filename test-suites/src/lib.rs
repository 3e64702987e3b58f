mod mock_chain;
mod test_fixture;

pub use mock_chain::MockChain;
pub use test_fixture::{test_secret, TestFixture, AQUA, BACKSTOP, BACKSTOP_LP, EURC, POOL, USDC, XLM};
