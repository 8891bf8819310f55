use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is blank.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id! {
    /// Account number identifying a bank account entity.
    ///
    /// Opaque to the system; uniqueness is the caller's responsibility.
    AccountNumber
}

opaque_id! {
    /// Customer number recorded when an account is opened.
    CustomerNumber
}

opaque_id! {
    /// Transaction identifier, globally unique per saga.
    TransactionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_number_string_conversion() {
        let a = AccountNumber::new("A1");
        assert_eq!(a.as_str(), "A1");

        let b: AccountNumber = "A2".into();
        assert_eq!(b.as_str(), "A2");
        assert_eq!(b.to_string(), "A2");
    }

    #[test]
    fn test_identifiers_order_and_compare() {
        let a = AccountNumber::new("A1");
        let b = AccountNumber::new("A2");
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_empty() {
        assert!(TransactionId::new("").is_empty());
        assert!(!TransactionId::new("t1").is_empty());
    }

    #[test]
    fn test_serialization_is_transparent() {
        let id = TransactionId::new("t-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t-42\"");

        let back: TransactionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
