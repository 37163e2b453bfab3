//! Configuration - type-safe session settings

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform settings, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    pub app: AppSettings,

    /// Session defaults
    pub session: SessionSettings,

    /// Market seed and guard bounds
    pub market: MarketSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level filter (overridden by RUST_LOG)
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Default starting cash for new teams
    pub starting_balance: f64,

    /// Trade-request time to live, in milliseconds
    pub request_ttl_ms: u64,

    /// Countdown granularity. One second per the game rules; tests shrink it
    /// to avoid wall-clock waits.
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Lower circuit bound as a fraction of current price
    pub circuit_lower: f64,

    /// Upper circuit bound as a fraction of current price
    pub circuit_upper: f64,

    /// Instruments seeded into the registry at init/reset
    pub instruments: Vec<InstrumentSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSeed {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSettings {
                log_level: "info".to_string(),
            },
            session: SessionSettings {
                starting_balance: 100_000.0,
                request_ttl_ms: 20_000,
                tick_interval_ms: 1_000,
            },
            market: MarketSettings {
                circuit_lower: 0.92,
                circuit_upper: 1.08,
                instruments: vec![
                    InstrumentSeed {
                        symbol: "ACME".to_string(),
                        name: "Acme Industries".to_string(),
                        price: 400.0,
                    },
                    InstrumentSeed {
                        symbol: "GLOB".to_string(),
                        name: "Globex Corporation".to_string(),
                        price: 150.0,
                    },
                    InstrumentSeed {
                        symbol: "INIT".to_string(),
                        name: "Initech Systems".to_string(),
                        price: 75.0,
                    },
                    InstrumentSeed {
                        symbol: "UMBR".to_string(),
                        name: "Umbrella Holdings".to_string(),
                        price: 220.0,
                    },
                ],
            },
        }
    }
}

impl Settings {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::core::Error::Config(format!("failed to read settings: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("failed to parse settings: {}", e)))
    }
}
