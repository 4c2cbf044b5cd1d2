use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The specification repository a pull request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecType {
    Eip,
    Erc,
    Rip,
}

impl SpecType {
    pub const ALL: [SpecType; 3] = [SpecType::Eip, SpecType::Erc, SpecType::Rip];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecType::Eip => "EIP",
            SpecType::Erc => "ERC",
            SpecType::Rip => "RIP",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            SpecType::Eip => Category::Eips,
            SpecType::Erc => Category::Ercs,
            SpecType::Rip => Category::Rips,
        }
    }
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown specification type: {0}")]
pub struct ParseSpecTypeError(pub String);

impl FromStr for SpecType {
    type Err = ParseSpecTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EIP" => Ok(SpecType::Eip),
            "ERC" => Ok(SpecType::Erc),
            "RIP" => Ok(SpecType::Rip),
            _ => Err(ParseSpecTypeError(s.to_string())),
        }
    }
}

impl Serialize for SpecType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpecType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Chart category: one per specification type plus their union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Eips,
    Ercs,
    Rips,
    All,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Eips => "eips",
            Category::Ercs => "ercs",
            Category::Rips => "rips",
            Category::All => "all",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eips" | "eip" => Ok(Category::Eips),
            "ercs" | "erc" => Ok(Category::Ercs),
            "rips" | "rip" => Ok(Category::Rips),
            "all" => Ok(Category::All),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}
