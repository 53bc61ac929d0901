use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When pending alerts are flushed to delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Flush whenever anything is pending.
    Immediate,
    /// Flush when the oldest alert has waited long enough, or enough piled up.
    TimeWindow,
    /// At most one flush per digest interval.
    DailyDigest,
    /// Confidence-driven: critical alerts go at once, medium ones in pairs or after a wait.
    SmartBatch,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Immediate,
        Strategy::TimeWindow,
        Strategy::DailyDigest,
        Strategy::SmartBatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::TimeWindow => "time_window",
            Self::DailyDigest => "daily_digest",
            Self::SmartBatch => "smart_batch",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| format!("unknown alert strategy `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde() {
        for s in Strategy::ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json.trim_matches('"'), s.as_str());
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
        }
        assert!("weekly".parse::<Strategy>().is_err());
    }
}
