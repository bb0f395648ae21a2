/// Background workers: receipt reconciliation and reward epoch building.

pub mod epoch;
pub mod reconciler;

pub use epoch::EpochCalculator;
pub use reconciler::TxReconciler;
