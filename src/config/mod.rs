pub mod settings;

pub use settings::{
    Configuration,
    ControlProfile,
    RegisterBlockConfig,
    RegisterConfig,
    RegisterType,
    Routine,
    RoutineParameter,
    Settings,
    DEFAULT_CONFIG_FILE,
    ROUTINE_PARAMETER_SLOTS,
};
