//! Scalar and enumeration types shared across the generator.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

/// Direction of data flow of a matrix within one gemm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFlowDirection {
    /// The matrix is read.
    Source,
    /// The matrix is written.
    Sink,
}

/// How the per-batch pointer of a matrix is recovered from the batch index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
pub enum Addressing {
    /// A single matrix shared by all batch elements.
    #[strum(serialize = "none")]
    None,
    /// Batches laid out contiguously; the pointer advances by the real
    /// matrix volume per batch element.
    #[strum(serialize = "strided")]
    Strided,
    /// An array of pointers, one per batch element.
    #[strum(serialize = "pointer_based")]
    PtrBased,
}

impl Addressing {
    /// Pointer spelling of a kernel parameter with this addressing.
    #[must_use]
    pub const fn ptr_type(self) -> &'static str {
        match self {
            Addressing::None | Addressing::Strided => "*",
            Addressing::PtrBased => "**",
        }
    }
}

/// Floating-point type of the generated kernel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
pub enum FloatingPointType {
    /// Single precision.
    #[strum(serialize = "float")]
    Float,
    /// Double precision.
    #[strum(serialize = "double")]
    Double,
}

impl FloatingPointType {
    /// The C spelling of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FloatingPointType::Float => "float",
            FloatingPointType::Double => "double",
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            FloatingPointType::Float => 4,
            FloatingPointType::Double => 8,
        }
    }

    /// Suffix appended to floating-point literals, e.g. `0.0f`.
    #[must_use]
    pub const fn literal_suffix(self) -> &'static str {
        match self {
            FloatingPointType::Float => "f",
            FloatingPointType::Double => "",
        }
    }
}

/// A gemm scaling factor: either a compile-time constant folded into the
/// generated source, or a named scalar passed as a kernel parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// A numeric literal baked into the kernel text.
    Literal(f64),
    /// A runtime scalar; the string is the parameter name.
    Param(String),
}

impl Scalar {
    /// Whether the scalar is a numeric literal.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Scalar::Literal(_))
    }

    /// The literal value, if any.
    #[must_use]
    pub const fn literal(&self) -> Option<f64> {
        match self {
            Scalar::Literal(value) => Some(*value),
            Scalar::Param(_) => None,
        }
    }

    /// Whether the scalar is known to be zero at generation time.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, Scalar::Literal(value) if *value == 0.0)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // `{:?}` keeps the decimal point on round values, e.g. `1.0`.
            Scalar::Literal(value) => write!(f, "{value:?}"),
            Scalar::Param(name) => f.write_str(name),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Literal(value)
    }
}

impl From<&str> for Scalar {
    fn from(name: &str) -> Self {
        Scalar::Param(name.to_string())
    }
}

/// Fixed names appearing in every generated kernel and launcher.
pub mod lexicon {
    /// Name of the batch-count parameter.
    pub const NUM_ELEMENTS: &str = "numElements";
    /// Suffix of the implicit per-symbol offset parameter.
    pub const EXTRA_OFFSET_SUFFIX: &str = "_extraOffset";
    /// Name of the opaque stream parameter of the launcher.
    pub const STREAM_PTR: &str = "streamPtr";
    /// Default name of the runtime `alpha` scalar.
    pub const ALPHA: &str = "alpha";
    /// Default name of the runtime `beta` scalar.
    pub const BETA: &str = "beta";
    /// Name of the batch-index variable inside the kernel.
    pub const BATCH_ID: &str = "bid";
    /// Name of the per-batch execution-mask parameter.
    pub const FLAGS: &str = "flags";
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn addressing_round_trips_through_strings() {
        for (text, addr) in [
            ("none", Addressing::None),
            ("strided", Addressing::Strided),
            ("pointer_based", Addressing::PtrBased),
        ] {
            assert_eq!(Addressing::from_str(text).unwrap(), addr);
            assert_eq!(addr.to_string(), text);
        }
        assert!(Addressing::from_str("scattered").is_err());
    }

    #[test]
    fn scalar_literal_formatting_keeps_decimal_point() {
        assert_eq!(Scalar::from(1.0).to_string(), "1.0");
        assert_eq!(Scalar::from(0.5).to_string(), "0.5");
        assert_eq!(Scalar::from("alpha").to_string(), "alpha");
    }

    #[test]
    fn scalar_zero_detection() {
        assert!(Scalar::from(0.0).is_zero());
        assert!(!Scalar::from(1.0).is_zero());
        assert!(!Scalar::from("beta").is_zero());
    }
}
