use sea_orm::{
    sea_query::{ArrayType, Nullable, ValueType, ValueTypeErr},
    DbErr, QueryResult, TryFromU64, TryGetError, TryGetable, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;

// Row ids are assigned by the database (auto increment), so there is no `new()`.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn from_i64(raw: i64) -> Self {
                Self(raw)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }

            pub fn parse_str(s: &str) -> Result<Self, ParseIntError> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_str(s)
            }
        }

        // SeaORM trait implementations
        impl From<$name> for Value {
            fn from(id: $name) -> Self {
                Value::BigInt(Some(id.0))
            }
        }

        impl TryGetable for $name {
            fn try_get_by<I: sea_orm::ColIdx>(
                res: &QueryResult,
                idx: I,
            ) -> Result<Self, TryGetError> {
                let raw: i64 = res.try_get_by(idx).map_err(TryGetError::DbErr)?;
                Ok(Self(raw))
            }
        }

        impl ValueType for $name {
            fn try_from(v: Value) -> Result<Self, ValueTypeErr> {
                match v {
                    Value::BigInt(Some(raw)) => Ok(Self(raw)),
                    Value::Int(Some(raw)) => Ok(Self(raw.into())),
                    _ => Err(ValueTypeErr),
                }
            }

            fn type_name() -> String {
                stringify!($name).to_owned()
            }

            fn array_type() -> ArrayType {
                ArrayType::BigInt
            }

            fn column_type() -> sea_orm::ColumnType {
                sea_orm::ColumnType::BigInteger
            }
        }

        impl Nullable for $name {
            fn null() -> Value {
                Value::BigInt(None)
            }
        }

        // Needed for auto increment primary keys: the insert result reports
        // the new row id as a u64.
        impl TryFromU64 for $name {
            fn try_from_u64(n: u64) -> Result<Self, DbErr> {
                <i64 as TryFrom<u64>>::try_from(n)
                    .map(Self)
                    .map_err(|_| DbErr::ConvertFromU64(stringify!($name)))
            }
        }
    };
}

define_id!(UserId);
define_id!(PostId);
define_id!(ReplyId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_conversion() {
        let id = ReplyId::from_i64(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(ReplyId::from(42), id);
    }

    #[test]
    fn test_id_string_conversion() {
        let id = PostId::from_i64(7);
        let parsed = PostId::parse_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(PostId::parse_str("seven").is_err());
    }

    #[test]
    fn test_id_serialization() {
        let id = UserId::from_i64(9);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "9");
        let deserialized: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_id_from_u64() {
        assert_eq!(ReplyId::try_from_u64(3).unwrap(), ReplyId::from_i64(3));
        assert!(ReplyId::try_from_u64(u64::MAX).is_err());
    }

    #[test]
    fn test_id_value_type() {
        let value: Value = ReplyId::from_i64(5).into();
        assert_eq!(<ReplyId as ValueType>::try_from(value).unwrap(), ReplyId::from_i64(5));
        assert!(<ReplyId as ValueType>::try_from(Value::BigInt(None)).is_err());
    }
}
