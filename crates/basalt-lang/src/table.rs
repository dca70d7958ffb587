//! Numeric lookup tables.
//!
//! A table declaration is `table <name> { [snap] [clamp] { v0, v1, ... } }`.
//! Lookups interpolate between neighbouring values, wrap the index into
//! `[0, 1)` unless the table clamps, and snap to the left value when the
//! `snap` flag is present.

use once_cell::sync::OnceCell;

use basalt_core::{BasaltError, BasaltResult};

use crate::tokens::Tokeniser;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableValues {
    pub snap: bool,
    pub clamp: bool,
    pub values: Vec<f32>,
}

/// A named lookup table. The body is kept as raw text and parsed on the
/// first value query.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    name: String,
    block: String,
    parsed: OnceCell<TableValues>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block: block.into(),
            parsed: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse the stored block if that hasn't happened yet and return
    /// the values. Parse failures are reported every time until a parse
    /// succeeds (they never will for a fixed block, but the registry
    /// may swap the definition).
    pub fn ensure_parsed(&self) -> BasaltResult<&TableValues> {
        self.parsed.get_or_try_init(|| parse_table_block(&self.block))
    }

    /// Look up a value. Parse problems degrade to 0.0 with a warning,
    /// matching the behaviour of a missing table.
    pub fn get_value(&self, index: f32) -> f32 {
        let table = match self.ensure_parsed() {
            Ok(table) => table,
            Err(err) => {
                tracing::warn!("table '{}' is unusable: {}", self.name, err);
                return 0.0;
            }
        };

        match table.values.len() {
            0 => return 0.0,
            1 => return table.values[0],
            _ => {}
        }

        let count = table.values.len();
        let scaled = if table.clamp {
            index.clamp(0.0, 1.0) * (count - 1) as f32
        } else {
            // Wrap into [0, 1), keeping negative indices seamless
            let mut frac = index.fract();
            if frac < 0.0 {
                frac += 1.0;
            }
            frac * count as f32
        };

        let left = (scaled.floor() as usize) % count;
        if table.snap {
            return table.values[left];
        }

        let frac = scaled - scaled.floor();
        let right = (left + 1) % count;
        table.values[left] + frac * (table.values[right] - table.values[left])
    }
}

fn parse_table_block(block: &str) -> BasaltResult<TableValues> {
    let mut tok = Tokeniser::new(block);
    let mut table = TableValues::default();
    let mut level = 0usize;
    let mut block_seen = false;

    while tok.has_more() {
        let line = tok.line();
        let token = tok.next_token()?;

        match token.as_str() {
            "{" => {
                level += 1;
                block_seen = true;
                if level > 1 {
                    return Err(BasaltError::parse(
                        "too many opening braces in table definition",
                        line,
                    ));
                }
            }
            "}" => {
                level = level.checked_sub(1).ok_or_else(|| {
                    BasaltError::parse("stray closing brace in table definition", line)
                })?;
            }
            "," => {}
            _ => match token.to_lowercase().as_str() {
                "snap" if !block_seen => table.snap = true,
                "clamp" if !block_seen => table.clamp = true,
                "snap" | "clamp" => {
                    return Err(BasaltError::parse(
                        format!("'{}' must precede the value block", token),
                        line,
                    ));
                }
                _ => {
                    let value: f32 = token.parse().map_err(|_| {
                        BasaltError::parse(
                            format!("expected numeric table value, got '{}'", token),
                            line,
                        )
                    })?;
                    table.values.push(value);
                }
            },
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(def: &str) -> TableDefinition {
        TableDefinition::new("test", def)
    }

    #[test]
    fn test_empty_table_is_zero() {
        let t = table("{ }");
        assert_eq!(t.get_value(0.0), 0.0);
        assert_eq!(t.get_value(0.7), 0.0);
    }

    #[test]
    fn test_single_value_is_constant() {
        let t = table("{ 0.5 }");
        assert_eq!(t.get_value(-3.0), 0.5);
        assert_eq!(t.get_value(0.0), 0.5);
        assert_eq!(t.get_value(42.0), 0.5);
    }

    #[test]
    fn test_interpolation() {
        let t = table("{ 0, 1 }");
        // index 0.25 scales to 0.5 between values[0] and values[1]
        assert!((t.get_value(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(t.get_value(0.0), 0.0);
        // midpoint of the wrap-around segment from 1 back to 0
        assert!((t.get_value(0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_periodicity() {
        let t = table("{ 0, 0.25, 1, 0.5 }");
        for x in [-1.3f32, -0.2, 0.0, 0.31, 0.77, 2.5] {
            assert!(
                (t.get_value(x) - t.get_value(x + 1.0)).abs() < 1e-6,
                "period broken at {}",
                x
            );
        }
    }

    #[test]
    fn test_clamp_saturation() {
        let t = table("clamp { 0.2, 0.4, 0.9 }");
        assert_eq!(t.get_value(-5.0), 0.2);
        assert_eq!(t.get_value(0.0), 0.2);
        assert_eq!(t.get_value(1.0), 0.9);
        assert_eq!(t.get_value(7.0), 0.9);
    }

    #[test]
    fn test_snap_is_discrete() {
        let t = table("snap { 0, 1, 0.5 }");
        for x in [0.0f32, 0.1, 0.34, 0.5, 0.66, 0.99] {
            let v = t.get_value(x);
            assert!(
                v == 0.0 || v == 1.0 || v == 0.5,
                "snapped value {} is interpolated",
                v
            );
        }
    }

    #[test]
    fn test_snap_clamp_example() {
        // 0.6 * 2 = 1.2, floor 1, snapped to values[1]
        let t = table("snap clamp { 0, 1, 0.5 }");
        assert_eq!(t.get_value(0.6), 1.0);
    }

    #[test]
    fn test_nested_brace_fails() {
        let t = table("{ { 0, 1 } }");
        assert!(t.ensure_parsed().is_err());
    }

    #[test]
    fn test_flag_after_block_fails() {
        let t = table("{ 0, 1 } snap");
        assert!(t.ensure_parsed().is_err());
    }

    #[test]
    fn test_non_numeric_fails() {
        let t = table("{ 0, bogus }");
        assert!(t.ensure_parsed().is_err());
    }

    #[test]
    fn test_unusable_table_evaluates_to_zero() {
        let t = table("{ nan-ish garbage values }");
        assert_eq!(t.get_value(0.5), 0.0);
    }
}
