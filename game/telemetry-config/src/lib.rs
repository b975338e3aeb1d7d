pub mod config;

pub use config::{
    AgentTrigger, ConfigAgent, ConfigPvp, ConfigRcon, ConfigSave, ConfigSftp, ConfigTelemetry,
    SaveMode,
};
