//! Lifecycle states stored in the status columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DatabaseError;

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub(crate) fn from_column(value: String) -> Result<Self, DatabaseError> {
                value.parse().map_err(|_| DatabaseError::Corrupt {
                    column: "status",
                    value,
                })
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum! {
    /// Aggregate state of an upload session.
    SessionStatus {
        Processing => "PROCESSING",
        Success => "SUCCESS",
        Failed => "FAILED",
    }
}

status_enum! {
    /// Per-document mark status. `Pending` is left exactly once.
    DocumentStatus {
        Pending => "PENDING",
        Successful => "SUCCESSFUL",
        Failed => "FAILED",
    }
}

status_enum! {
    /// Lifecycle of the text analysis sub-pipeline.
    AnalysisStatus {
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        assert_eq!("SUCCESS".parse::<SessionStatus>(), Ok(SessionStatus::Success));
        assert_eq!(DocumentStatus::Successful.as_str(), "SUCCESSFUL");
        assert_eq!(AnalysisStatus::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn test_unknown_column_value_is_corrupt() {
        let err = DocumentStatus::from_column("DONE".to_string()).unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt { column: "status", .. }));
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&DocumentStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let parsed: SessionStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(parsed, SessionStatus::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(DocumentStatus::Successful.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
    }
}
