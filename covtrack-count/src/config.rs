use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use covtrack_core::errors::{CountError, Result};
use covtrack_core::models::StrandOption;

use crate::consts::{
    DEFAULT_EXTENSION_FACTOR, DEFAULT_HISTOGRAM_CAPACITY, DEFAULT_MIN_MAPPING_QUALITY,
    DEFAULT_WINDOW_SIZE,
};

///
/// Whether coverage is reported as one combined value or split by fragment strand.
///
/// In `StrandSplit` mode alignments whose fragment strand cannot be resolved are filtered
/// out, and every window carries a `[positive, negative]` pair next to its coverage.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrandMode {
    #[default]
    Combined,
    StrandSplit(StrandOption),
}

///
/// Auxiliary outputs switched on by the `i,o,m,h` option tokens.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxOptions {
    pub insert_size: bool,
    pub orientation: bool,
    pub mismatch: bool,
    pub histogram: bool,
}

impl AuxOptions {
    ///
    /// Parse a comma separated token set such as `"i,m,h"`.
    ///
    /// Unknown tokens are reported with a warning and otherwise ignored.
    ///
    pub fn parse(options: &str) -> Self {
        let mut aux = AuxOptions::default();
        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "i" => aux.insert_size = true,
                "o" => aux.orientation = true,
                "m" => aux.mismatch = true,
                "h" => aux.histogram = true,
                other => warn!("Unknown coverage option: {}", other),
            }
        }
        aux
    }

}

///
/// Immutable settings for one counting run.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountConfig {
    pub window_size: u32,
    pub extension_factor: u32,
    pub min_mapping_quality: u8,
    pub strand_mode: StrandMode,
    /// Genome build handed to the reference lookup, e.g. `hg38`.
    pub genome: Option<String>,
    pub aux: AuxOptions,
    pub histogram_capacity: usize,
}

impl Default for CountConfig {
    fn default() -> Self {
        CountConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            extension_factor: DEFAULT_EXTENSION_FACTOR,
            min_mapping_quality: DEFAULT_MIN_MAPPING_QUALITY,
            strand_mode: StrandMode::Combined,
            genome: None,
            aux: AuxOptions::default(),
            histogram_capacity: DEFAULT_HISTOGRAM_CAPACITY,
        }
    }
}

impl CountConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: CountConfig =
            toml::from_str(contents).map_err(|e| CountError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(CountError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.checked_tolerance().is_none() {
            return Err(CountError::InvalidConfig(format!(
                "window_size {} with extension_factor {} gives a sort tolerance past {}",
                self.window_size,
                self.extension_factor,
                u32::MAX
            )));
        }
        Ok(())
    }

    fn checked_tolerance(&self) -> Option<u32> {
        self.extension_factor
            .checked_div(self.window_size)?
            .checked_add(2)?
            .checked_mul(self.window_size)
    }

    ///
    /// Minimum lag kept between the current read start and the earliest open window.
    ///
    /// A read extended backwards by `extension_factor` can never reach a window that
    /// closed this far behind it. Saturates for configs that [`CountConfig::validate`]
    /// rejects.
    ///
    pub fn tolerance(&self) -> u32 {
        self.checked_tolerance().unwrap_or(u32::MAX)
    }

    pub fn strand_option(&self) -> Option<StrandOption> {
        match self.strand_mode {
            StrandMode::Combined => None,
            StrandMode::StrandSplit(option) => Some(option),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_parse_aux_options() {
        let aux = AuxOptions::parse("i,m,h");
        assert!(aux.insert_size);
        assert!(!aux.orientation);
        assert!(aux.mismatch);
        assert!(aux.histogram);
    }

    #[rstest]
    fn test_unknown_options_are_not_fatal() {
        let aux = AuxOptions::parse("o,zz,,h");
        assert_eq!(
            aux,
            AuxOptions {
                orientation: true,
                histogram: true,
                ..Default::default()
            }
        );
    }

    #[rstest]
    #[case(25, 0, 50)]
    #[case(25, 200, 250)]
    #[case(10, 5, 20)]
    #[case(1, 150, 152)]
    fn test_tolerance(#[case] window_size: u32, #[case] extension: u32, #[case] expected: u32) {
        let config = CountConfig {
            window_size,
            extension_factor: extension,
            ..Default::default()
        };
        assert_eq!(config.tolerance(), expected);
        assert!(config.tolerance() >= extension + window_size);
    }

    #[rstest]
    fn test_config_from_toml() {
        let config = CountConfig::from_toml_str(
            r#"
            window_size = 50
            extension_factor = 150
            min_mapping_quality = 10
            genome = "hg38"
            strand_mode = { strand-split = "first-of-pair" }

            [aux]
            mismatch = true
            "#,
        )
        .unwrap();
        assert_eq!(config.window_size, 50);
        assert_eq!(config.extension_factor, 150);
        assert_eq!(config.min_mapping_quality, 10);
        assert_eq!(config.genome.as_deref(), Some("hg38"));
        assert_eq!(
            config.strand_mode,
            StrandMode::StrandSplit(StrandOption::FirstOfPair)
        );
        assert!(config.aux.mismatch);
        assert!(!config.aux.histogram);
        assert_eq!(config.histogram_capacity, DEFAULT_HISTOGRAM_CAPACITY);
    }

    #[rstest]
    fn test_zero_window_size_is_rejected() {
        let result = CountConfig::from_toml_str("window_size = 0");
        assert!(matches!(result, Err(CountError::InvalidConfig(_))));
    }

    #[rstest]
    #[case(3_000_000_000, 0)]
    #[case(1, u32::MAX - 1)]
    #[case(2_000_000_000, 2_000_000_000)]
    fn test_overflowing_tolerance_is_rejected(#[case] window_size: u32, #[case] extension: u32) {
        let config = CountConfig {
            window_size,
            extension_factor: extension,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CountError::InvalidConfig(_))));
        assert_eq!(config.tolerance(), u32::MAX);
    }

    #[rstest]
    fn test_largest_tolerance_is_accepted() {
        let config = CountConfig {
            window_size: 1,
            extension_factor: u32::MAX - 2,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.tolerance(), u32::MAX);
    }
}
