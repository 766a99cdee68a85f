pub mod condensation;
pub mod config;
pub mod masks;
pub mod simple;

pub use condensation::{calc_lv_lbeta, CondensationInput, CondensationLoss, EnergyInput, LossComponents};
pub use config::{BetaStabilizing, CondensationConfig, SimpleClusSpaceConfig};
pub use simple::{calc_simple_clus_space_loss, SimpleClusSpaceLoss};
