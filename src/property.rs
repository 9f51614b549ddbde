use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tag byte marking an extended (named) property inside an image.
pub const EXTENDED_PROPERTY_TAG: u8 = 9;

/// The closed set of property types a WZ image can hold. Plain values
/// carry a numeric tag byte; container and media types are spelled out as
/// an extended type name. Decoding the values themselves is the image
/// parser's job, the directory layer only needs the vocabulary.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WzPropertyKind {
    Null,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Vector,
    Canvas,
    Convex,
    Sound,
    Uol,
    Sub,
}

impl WzPropertyKind {
    /// Classify a plain-value tag byte. Extended properties (tag 9) carry
    /// their type as a string instead, see [`WzPropertyKind::from_type_name`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(WzPropertyKind::Null),
            2 | 11 => Some(WzPropertyKind::Short),
            3 | 19 => Some(WzPropertyKind::Int),
            20 => Some(WzPropertyKind::Long),
            4 => Some(WzPropertyKind::Float),
            5 => Some(WzPropertyKind::Double),
            8 => Some(WzPropertyKind::String),
            _ => None,
        }
    }

    /// Classify an extended property type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Property" => Some(WzPropertyKind::Sub),
            "Canvas" => Some(WzPropertyKind::Canvas),
            "Shape2D#Vector2D" => Some(WzPropertyKind::Vector),
            "Shape2D#Convex2D" => Some(WzPropertyKind::Convex),
            "Sound_DX8" => Some(WzPropertyKind::Sound),
            "UOL" => Some(WzPropertyKind::Uol),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WzPropertyKind::Null => "Null",
            WzPropertyKind::Short => "Short",
            WzPropertyKind::Int => "Int",
            WzPropertyKind::Long => "Long",
            WzPropertyKind::Float => "Float",
            WzPropertyKind::Double => "Double",
            WzPropertyKind::String => "String",
            WzPropertyKind::Vector => "Vector",
            WzPropertyKind::Canvas => "Canvas",
            WzPropertyKind::Convex => "Convex",
            WzPropertyKind::Sound => "Sound",
            WzPropertyKind::Uol => "UOL",
            WzPropertyKind::Sub => "Sub",
        }
    }
}

impl fmt::Display for WzPropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
