pub mod config_file;
pub mod scheduler;
pub mod window;

pub use scheduler::{
    GameControl, LogOperator, OperatorChannel, PvpScheduler, RconControl, ToggleError,
};
pub use window::{warning_ladder, PvpWindow};
