//! Serializable delay presets.
//!
//! ```
//! use multitap::config::DelayConfig;
//!
//! let config = DelayConfig::from_json(r#"{ "frequency": 44100.0, "tap_delays_ms": [125.0, 250.0] }"#).unwrap();
//! let delay = config.build().unwrap();
//! assert_eq!(delay.tap_samples(), &[5513, 11025]);
//! ```

use serde::{Deserialize, Serialize};

use crate::delay::{MultiTapDelay, DEFAULT_ATTENUATION, DEFAULT_TAP_MS, DEFAULT_WET_GAIN};
use crate::effect::{validate_frequency, TapList, DEFAULT_FREQUENCY, DEFAULT_MIX};
use crate::error::{EngineError, EngineResult};

/// Complete user-facing state of a multi-tap delay. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig
{
    pub enabled : bool,
    /// Sample rate in Hz.
    pub frequency : f32,
    /// Wet/dry mix, clamped to `0.0..=1.0` when applied.
    pub mix : f32,
    /// Tap delays in milliseconds, in order.
    pub tap_delays_ms : Vec<f32>,
    /// Per-tap attenuation, clamped to `0.25..=1.0` when applied.
    pub attenuation : f32,
    pub compressor : bool,
    /// Wet path headroom, clamped to `0.0..=1.0` when applied.
    pub wet_gain : f32
}
impl Default for DelayConfig
{
    fn default() -> Self
    {
        Self
        {
            enabled : true,
            frequency : DEFAULT_FREQUENCY,
            mix : DEFAULT_MIX,
            tap_delays_ms : vec![DEFAULT_TAP_MS],
            attenuation : DEFAULT_ATTENUATION,
            compressor : false,
            wet_gain : DEFAULT_WET_GAIN
        }
    }
}
impl DelayConfig
{
    /// Checks every field. Values that setters clamp only have to be numbers.
    pub fn validate(&self) -> EngineResult<()>
    {
        validate_frequency(self.frequency)?;
        TapList::from_millis(&self.tap_delays_ms)?;
        if self.mix.is_nan() { return Err(EngineError::InvalidParameter("mix is NaN")); }
        if self.attenuation.is_nan() { return Err(EngineError::InvalidParameter("attenuation is NaN")); }
        if self.wet_gain.is_nan() { return Err(EngineError::InvalidParameter("wet gain is NaN")); }
        Ok(())
    }

    /// Parse a preset from JSON.
    pub fn from_json(json : &str) -> EngineResult<Self>
    {
        let config : Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the preset as pretty-printed JSON.
    pub fn to_json(&self) -> EngineResult<String> { return Ok(serde_json::to_string_pretty(self)?); }

    /// Build a delay with these settings.
    pub fn build(&self) -> EngineResult<MultiTapDelay> { return MultiTapDelay::from_config(self); }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::effect::Effect;

    #[test]
    fn missing_fields_take_defaults()
    {
        let config = DelayConfig::from_json("{}").unwrap();
        assert_eq!(config, DelayConfig::default());
        assert_eq!(config.tap_delays_ms, vec![200.0]);
    }

    #[test]
    fn json_round_trip()
    {
        let config = DelayConfig { frequency : 48000.0, tap_delays_ms : vec![10.0, 20.0, 30.0], compressor : true, ..Default::default() };
        let json = config.to_json().unwrap();
        assert_eq!(DelayConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn invalid_presets_are_rejected()
    {
        let error = DelayConfig::from_json(r#"{ "frequency": -1.0 }"#).unwrap_err();
        assert_eq!(error, EngineError::InvalidFrequency(-1.0));

        let error = DelayConfig::from_json(r#"{ "tap_delays_ms": [10.0, 9000.0] }"#).unwrap_err();
        assert!(matches!(error, EngineError::InvalidTapDelay { index : 1, .. }));

        let error = DelayConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(error, EngineError::Config(_)));
        assert!(error.is_rejected_configuration());
    }

    #[test]
    fn build_applies_every_field()
    {
        let config = DelayConfig
        {
            enabled : false,
            frequency : 8000.0,
            mix : 2.0,
            tap_delays_ms : vec![100.0],
            attenuation : 0.1,
            compressor : true,
            wet_gain : 1.0
        };
        let delay = config.build().unwrap();
        assert!(!delay.is_enabled());
        assert_eq!(delay.frequency(), 8000.0);
        assert_eq!(delay.mix(), 1.0);
        assert_eq!(delay.tap_samples(), &[800]);
        assert_eq!(delay.attenuation(), 0.25);
        assert!(delay.is_compressor_enabled());
        assert_eq!(delay.wet_gain(), 1.0);
    }
}
