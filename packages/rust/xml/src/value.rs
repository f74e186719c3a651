//! Text coercion for element values and attributes.

use std::fmt;

/// A value to be written as element text or attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    /// Renders as the empty string.
    Null,
    /// Renders as `true` / `false`.
    Bool(bool),
    Text(String),
    /// An opaque object; renders as `[TypeName]`.
    Object(String),
    /// A list or map that was not expanded; renders as `[array]`.
    Array,
}

impl XmlValue {
    /// Placeholder value for an object of type `T`.
    pub fn object_of<T: ?Sized>() -> Self {
        Self::Object(std::any::type_name::<T>().to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for XmlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Self::Text(s) => f.write_str(s),
            Self::Object(type_name) => write!(f, "[{type_name}]"),
            Self::Array => f.write_str("[array]"),
        }
    }
}

impl From<&str> for XmlValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for XmlValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for XmlValue {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<bool> for XmlValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<()> for XmlValue {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl<T: Into<XmlValue>> From<Option<T>> for XmlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

macro_rules! numeric_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for XmlValue {
                fn from(n: $ty) -> Self {
                    Self::Text(n.to_string())
                }
            }
        )*
    };
}

numeric_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);
