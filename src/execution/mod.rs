// Market data, order execution and the trading loop
pub mod candle_buffer;
pub mod executor;
pub mod position_manager;
pub mod price_feed;
pub mod scheduler;

pub use candle_buffer::{CandleSnapshot, CandleStore};
pub use executor::{buy_notional, sell_quantity, OrderExecutor, PaperExecutor};
pub use position_manager::{ActivePosition, ClosedTrade, PositionManager, PositionState};
pub use price_feed::{chunk_symbols, parse_stream_message, IngestionHandler, KlinePoller};
pub use scheduler::{ControlCommand, Scheduler, TickAction, TickReport, TradingSwitch};
