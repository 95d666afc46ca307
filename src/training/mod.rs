mod epoch;
mod session;

pub use epoch::{evaluate_epoch, train_epoch};
pub use session::{run, setup, Orchestrator};
