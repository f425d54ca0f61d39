use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectStatus {
    Draft,
    Active,
    Archived,
}

impl ObjectStatus {
    pub const ALL: [ObjectStatus; 3] =
        [ObjectStatus::Draft, ObjectStatus::Active, ObjectStatus::Archived];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectStatus::Draft => "draft",
            ObjectStatus::Active => "active",
            ObjectStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectStatus {
    type Err = ParseObjectStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let status = match normalized.as_str() {
            "draft" => ObjectStatus::Draft,
            "active" => ObjectStatus::Active,
            "archived" => ObjectStatus::Archived,
            _ => {
                return Err(ParseObjectStatusError {
                    value: value.to_string(),
                });
            }
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseObjectStatusError {
    value: String,
}

impl fmt::Display for ParseObjectStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid object status '{}': expected one of {}",
            self.value,
            ObjectStatus::ALL
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseObjectStatusError {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::ObjectStatus;

    #[test]
    fn parses_all_statuses() {
        assert_eq!(ObjectStatus::from_str("draft").unwrap(), ObjectStatus::Draft);
        assert_eq!(ObjectStatus::from_str("Active").unwrap(), ObjectStatus::Active);
        assert_eq!(
            ObjectStatus::from_str(" archived ").unwrap(),
            ObjectStatus::Archived
        );
    }

    #[test]
    fn rejects_unknown_status() {
        let err = ObjectStatus::from_str("retired").unwrap_err();
        assert!(err.to_string().contains("retired"));
    }
}
