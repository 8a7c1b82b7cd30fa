pub(crate) mod settings;

pub use settings::{
    read_config, Configuration, DFConfig, DFConfigBuilder, JKConfig, JKConfigBuilder, ScfConfig,
};
