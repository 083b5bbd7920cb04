// Application Layer - dispatch loops and fan-out

pub mod dispatcher;
pub mod fanout;
pub mod shutdown;
pub mod sweeper;

// Re-exports
pub use dispatcher::{Dispatcher, DispatcherConfig, EscalationOutcome, TickSummary};
pub use fanout::{dispatch_batch, FanoutReport};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use sweeper::LedgerSweeper;
