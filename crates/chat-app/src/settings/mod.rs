pub mod state;

pub use state::{
    AgentSettings, RemoteSettings, Settings, SettingsError, SettingsStore, StoreBackend,
    StoreSettings,
};
