pub mod serve;
pub mod simulate;

pub use serve::ServeCommand;
pub use simulate::SimulateCommand;
