//! Worker domain types
//!
//! A worker is one remote process that performs a single pipeline stage. The
//! coordinator only knows its declared name, level and execution mode.

use std::{fmt::Display, net::SocketAddr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::CoordinatorError;

/// Which scheduling phase a worker takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum WorkerMode {
    /// Runs alone, consuming the previous worker's output
    Sequential,
    /// Runs concurrently against an identical snapshot
    Parallel
}

impl WorkerMode {
    /// Spelling used on the wire by this crate's worker runtime
    pub fn as_wire(&self) -> &'static str {
        match self {
            WorkerMode::Sequential => "Sequential",
            WorkerMode::Parallel => "Parallel"
        }
    }
}

impl Display for WorkerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

impl FromStr for WorkerMode {
    type Err = CoordinatorError;

    /// Accepts the English spellings in any case and the legacy Russian ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "sequential" | "последовательно" => Ok(WorkerMode::Sequential),
            "parallel" | "параллельно" => Ok(WorkerMode::Parallel),
            _ => Err(CoordinatorError::Handshake(format!("unknown mode '{}'", trimmed)))
        }
    }
}

/// Registration metadata of one connected worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Network endpoint, the registry key
    pub address:       SocketAddr,
    /// Unique among registered workers
    pub name:          String,
    /// Execution order and phase membership
    pub level:         u32,
    pub mode:          WorkerMode,
    pub registered_at: DateTime<Utc>,
    /// Registration order, used to break level ties
    pub sequence:      u64
}

impl Display for WorkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (Lvl {}, {}) - {}", self.name, self.level, self.mode, self.address.ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_spellings() {
        assert_eq!("Sequential".parse::<WorkerMode>().unwrap(), WorkerMode::Sequential);
        assert_eq!("parallel".parse::<WorkerMode>().unwrap(), WorkerMode::Parallel);
        assert_eq!("Последовательно".parse::<WorkerMode>().unwrap(), WorkerMode::Sequential);
        assert_eq!("Параллельно".parse::<WorkerMode>().unwrap(), WorkerMode::Parallel);
        assert!("Sideways".parse::<WorkerMode>().is_err());
    }
}
