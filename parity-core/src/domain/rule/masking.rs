// parity-core/src/domain/rule/masking.rs

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::compiler::quoter::SqlQuoter;

/// How a mask shape is verified. `FixedPosition` compares a fixed-width
/// substring, which is only sound because upstream masks occupy fixed
/// positions. `Pattern` falls back to a full regex match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMethod {
    #[default]
    FixedPosition,
    Pattern,
}

impl FromStr for MaskMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed_position" | "substring" => Ok(Self::FixedPosition),
            "pattern" | "regex" => Ok(Self::Pattern),
            _ => Err(format!("Unknown masking method: {}", s)),
        }
    }
}

impl std::fmt::Display for MaskMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FixedPosition => "fixed_position",
            Self::Pattern => "pattern",
        };
        write!(f, "{}", s)
    }
}

fn default_hash_length() -> usize {
    64
}

/// Expected shape of a de-identified value. Offsets are 1-based, like SQL SUBSTRING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskShape {
    /// `literal` at `offset`; when `length` is set the whole value must be that long.
    /// Resident number: length 14, offset 8, "*******". Phone: offset 5, "****".
    FixedSubstring {
        #[serde(default)]
        length: Option<usize>,
        offset: usize,
        literal: String,
    },
    /// Hex digest of a fixed length (SHA-256 = 64).
    Hash {
        #[serde(default = "default_hash_length")]
        length: usize,
    },
    /// Raw values that slipped through: right length but no mask at `offset`.
    Leak {
        length: usize,
        offset: usize,
        literal: String,
    },
}

impl MaskShape {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::FixedSubstring {
                length,
                offset,
                literal,
            } => {
                check_literal(*offset, literal)?;
                if let Some(total) = length
                    && offset.saturating_sub(1) + literal.chars().count() > *total
                {
                    return Err(format!(
                        "mask literal at offset {} does not fit in length {}",
                        offset, total
                    ));
                }
                Ok(())
            }
            Self::Hash { length } => {
                if *length == 0 {
                    return Err("hash length must be positive".into());
                }
                Ok(())
            }
            Self::Leak {
                length,
                offset,
                literal,
            } => {
                check_literal(*offset, literal)?;
                if offset.saturating_sub(1) + literal.chars().count() > *length {
                    return Err(format!(
                        "mask literal at offset {} does not fit in length {}",
                        offset, length
                    ));
                }
                Ok(())
            }
        }
    }

    /// SQL boolean expression, true for violating rows. `column_sql` must already be quoted.
    pub fn violation_predicate(&self, column_sql: &str, method: MaskMethod) -> String {
        let value = format!("CAST({} AS VARCHAR)", column_sql);
        match method {
            MaskMethod::FixedPosition => match self {
                Self::FixedSubstring {
                    length,
                    offset,
                    literal,
                } => {
                    let slice = format!(
                        "substring({}, {}, {}) <> {}",
                        value,
                        offset,
                        literal.chars().count(),
                        SqlQuoter::literal(literal)
                    );
                    match length {
                        Some(total) => format!("(length({}) <> {} OR {})", value, total, slice),
                        None => format!("({})", slice),
                    }
                }
                Self::Hash { length } => format!(
                    "(length({v}) <> {l} OR trim(lower({v}), '0123456789abcdef') <> '')",
                    v = value,
                    l = length
                ),
                Self::Leak {
                    length,
                    offset,
                    literal,
                } => format!(
                    "(length({v}) = {l} AND substring({v}, {o}, {n}) <> {lit})",
                    v = value,
                    l = length,
                    o = offset,
                    n = literal.chars().count(),
                    lit = SqlQuoter::literal(literal)
                ),
            },
            MaskMethod::Pattern => {
                let matches = format!(
                    "regexp_full_match({}, {})",
                    value,
                    SqlQuoter::literal(&self.pattern())
                );
                match self {
                    Self::Leak { length, .. } => {
                        format!("(length({}) = {} AND NOT {})", value, length, matches)
                    }
                    _ => format!("(NOT {})", matches),
                }
            }
        }
    }

    /// Unanchored regex equivalent of the shape.
    pub fn pattern(&self) -> String {
        match self {
            Self::FixedSubstring {
                length,
                offset,
                literal,
            } => {
                let head = offset.saturating_sub(1);
                match length {
                    Some(total) => format!(
                        ".{{{}}}{}.{{{}}}",
                        head,
                        regex::escape(literal),
                        total.saturating_sub(head + literal.chars().count())
                    ),
                    None => format!(".{{{}}}{}.*", head, regex::escape(literal)),
                }
            }
            Self::Hash { length } => format!("[0-9a-fA-F]{{{}}}", length),
            Self::Leak {
                length,
                offset,
                literal,
            } => format!(
                ".{{{}}}{}.{{{}}}",
                offset.saturating_sub(1),
                regex::escape(literal),
                length.saturating_sub(offset.saturating_sub(1) + literal.chars().count())
            ),
        }
    }

    /// Human readable format for reports, e.g. `???????*******`.
    pub fn expected_format(&self) -> String {
        match self {
            Self::FixedSubstring {
                length,
                offset,
                literal,
            } => {
                let head = "?".repeat(offset.saturating_sub(1));
                match length {
                    Some(total) => format!(
                        "{}{}{}",
                        head,
                        literal,
                        "?".repeat(total.saturating_sub(offset.saturating_sub(1) + literal.chars().count()))
                    ),
                    None => format!("{}{}*", head, literal),
                }
            }
            Self::Hash { length } => format!("{} hex chars", length),
            Self::Leak {
                length,
                offset,
                literal,
            } => format!("{} chars without '{}' at {}", length, literal, offset),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::FixedSubstring { .. } => "fixed_substring",
            Self::Hash { .. } => "hash",
            Self::Leak { .. } => "leak",
        }
    }
}

fn check_literal(offset: usize, literal: &str) -> Result<(), String> {
    if offset == 0 {
        return Err("offset is 1-based and must be >= 1".into());
    }
    if literal.is_empty() {
        return Err("mask literal cannot be empty".into());
    }
    Ok(())
}
