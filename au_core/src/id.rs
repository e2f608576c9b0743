use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier backed by ULID, stored as its 26-char string form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(ulid::Ulid);

impl Id {
    /// Generate a new ID
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Whether `value` is a well-formed ID, used to reject junk path params early
    pub fn is_valid(value: &str) -> bool {
        value.parse::<ulid::Ulid>().is_ok()
    }

    /// Milliseconds since the epoch encoded in the ID
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_validation() {
        assert!(Id::is_valid(&Id::new().to_string()));
        assert!(!Id::is_valid("not-an-id"));
        assert!(!Id::is_valid(""));
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let first = Id::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Id::new();
        assert!(second.timestamp_ms() > first.timestamp_ms());
        assert!(second.to_string() > first.to_string());
    }
}
