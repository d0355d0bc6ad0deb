//! Byte size parsing
//!
//! Accepts sizes such as `512K`, `10MB`, `1.5GiB` or a bare byte count.
//! Units are binary (1K = 1024 bytes).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ByteSizeError {
    #[error("Invalid size '{input}'. Expected a number with an optional unit, like '512K' or '10MB'")]
    InvalidFormat { input: String },

    #[error("Unknown size unit '{unit}'. Supported units: B, K, M, G (with optional 'B' or 'iB' suffix)")]
    InvalidUnit { unit: String },

    #[error("Size {input} does not fit in memory on this platform")]
    TooLarge { input: String },
}

/// Parse a size string into a byte count
///
/// ```
/// use mock_completion::cli::size_parser::parse_byte_size;
///
/// assert_eq!(parse_byte_size("2048").unwrap(), 2048);
/// assert_eq!(parse_byte_size("10MB").unwrap(), 10 * 1024 * 1024);
/// assert_eq!(parse_byte_size("0.5K").unwrap(), 512);
/// ```
pub fn parse_byte_size(input: &str) -> Result<usize, ByteSizeError> {
    let normalized = input.trim().to_uppercase();
    let invalid = || ByteSizeError::InvalidFormat {
        input: input.to_string(),
    };

    let split = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier = unit_multiplier(unit.trim())?;
    let bytes = (value * multiplier as f64).floor();

    if bytes > usize::MAX as f64 {
        return Err(ByteSizeError::TooLarge {
            input: input.to_string(),
        });
    }
    Ok(bytes as usize)
}

fn unit_multiplier(unit: &str) -> Result<u64, ByteSizeError> {
    match unit {
        "" | "B" | "BYTES" => Ok(1),
        "K" | "KB" | "KIB" => Ok(1 << 10),
        "M" | "MB" | "MIB" => Ok(1 << 20),
        "G" | "GB" | "GIB" => Ok(1 << 30),
        _ => Err(ByteSizeError::InvalidUnit {
            unit: unit.to_string(),
        }),
    }
}

/// Render a byte count with the largest whole unit
pub fn format_byte_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 || size.fract() == 0.0 {
        format!("{:.0} {}", size, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
