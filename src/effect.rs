//! The effect contract shared by every processor in the engine.
//!
//! An effect is driven from a single real-time thread through [`Effect::process`].
//! Everything that changes its behaviour goes through the same trait: enable state,
//! sample rate, wet/dry mix and typed [`Parameter`] updates. Parameter updates are
//! validated before they touch any state, so a rejected update leaves the effect as it was.
//!
//! ## Example
//!
//! ```
//! use multitap::delay::MultiTapDelay;
//! use multitap::effect::{Effect, Parameter, TapList};
//!
//! let mut delay = MultiTapDelay::from_millis(&[100.0, 200.0]).unwrap();
//! delay.set_frequency(48000.0).unwrap();
//! delay.set_parameter(Parameter::TapDelaysMs(TapList::evenly_spaced(3, 600.0).unwrap())).unwrap();
//!
//! let input = [0.0f32; 256];
//! let mut output = [0.0f32; 256];
//! delay.process(&input, &mut output);
//! ```

use crate::error::{EngineError, EngineResult};

// ==========================================
// Constants
// ==========================================

/// Sample rate an effect assumes until told otherwise.
pub const DEFAULT_FREQUENCY : f32 = 22050.0;
/// Wet/dry mix of a new effect.
pub const DEFAULT_MIX : f32 = 0.5;
/// Highest supported sample rate in Hz.
pub const MAX_FREQUENCY : f32 = 96000.0;
/// Longest supported tap delay in seconds.
pub const MAX_TAP_DELAY_SECONDS : usize = 5;
/// Longest supported tap delay in milliseconds.
pub const MAX_TAP_DELAY_MS : f32 = (MAX_TAP_DELAY_SECONDS * 1000) as f32;
/// Number of entries in the fixed tap table.
pub const MAX_TAPS : usize = 64;

// ==========================================
// Tap List
// ==========================================

/// Ordered, fixed-capacity list of tap delays in milliseconds.
///
/// `TapList` is `Copy` so it can travel through the control queue to the audio
/// thread without allocating there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapList
{
    delays_ms : [f32; MAX_TAPS],
    len : usize
}
impl TapList
{
    /// An empty tap list.
    pub const fn new() -> Self { return Self { delays_ms : [0.0; MAX_TAPS], len : 0 }; }

    /// Build a tap list from millisecond delays.
    ///
    /// Every delay must be finite and within `0..=MAX_TAP_DELAY_MS`.
    pub fn from_millis(delays_ms : &[f32]) -> EngineResult<Self>
    {
        if delays_ms.len() > MAX_TAPS
        {
            return Err(EngineError::TooManyTaps { count : delays_ms.len(), max : MAX_TAPS });
        }
        let mut list = Self::new();
        for (index, &delay_ms) in delays_ms.iter().enumerate()
        {
            if !delay_ms.is_finite() || delay_ms < 0.0 || delay_ms > MAX_TAP_DELAY_MS
            {
                return Err(EngineError::InvalidTapDelay { index, delay_ms });
            }
            list.delays_ms[index] = delay_ms;
        }
        list.len = delays_ms.len();
        Ok(list)
    }

    /// Spread `count` taps evenly over `total_ms`, the last tap landing one step before it.
    ///
    /// Tap `i` sits at `(i + 1) * total_ms / (count + 1)`.
    pub fn evenly_spaced(count : usize, total_ms : f32) -> EngineResult<Self>
    {
        if count == 0 { return Err(EngineError::InvalidParameter("tap count must be positive")); }
        if count > MAX_TAPS { return Err(EngineError::TooManyTaps { count, max : MAX_TAPS }); }
        if !total_ms.is_finite() || total_ms <= 0.0 || total_ms > MAX_TAP_DELAY_MS
        {
            return Err(EngineError::InvalidTapDelay { index : count, delay_ms : total_ms });
        }
        let step = total_ms / (count + 1) as f32;
        let mut list = Self::new();
        for index in 0..count { list.delays_ms[index] = step * (index + 1) as f32; }
        list.len = count;
        Ok(list)
    }

    /// Copies delays that were derived from already validated sample offsets.
    pub(crate) fn from_derived(delays_ms : &[f32]) -> Self
    {
        let mut list = Self::new();
        let len = delays_ms.len().min(MAX_TAPS);
        list.delays_ms[..len].copy_from_slice(&delays_ms[..len]);
        list.len = len;
        list
    }

    /// Delays in declaration order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] { return &self.delays_ms[..self.len]; }
    /// Number of taps.
    #[inline]
    pub fn len(&self) -> usize { return self.len; }
    /// Whether the list holds no taps.
    #[inline]
    pub fn is_empty(&self) -> bool { return self.len == 0; }
}
impl Default for TapList
{
    fn default() -> Self { Self::new() }
}

// ==========================================
// Parameters
// ==========================================

/// Typed effect parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter
{
    /// Replace the tap list with delays in milliseconds.
    TapDelaysMs(TapList),
    /// Geometric decay applied to each tap after the first, clamped to `0.25..=1.0`.
    Attenuation(f32),
    /// Toggle tap-count level compensation.
    Compressor(bool),
    /// Headroom factor applied to the wet path, clamped to `0.0..=1.0`.
    WetGain(f32),
}
impl Parameter
{
    /// Checks the value independent of any effect state.
    pub fn validate(&self) -> EngineResult<()>
    {
        match self
        {
            Parameter::TapDelaysMs(_) | Parameter::Compressor(_) => Ok(()),
            Parameter::Attenuation(value) if value.is_nan() => Err(EngineError::InvalidParameter("attenuation is NaN")),
            Parameter::WetGain(value) if value.is_nan() => Err(EngineError::InvalidParameter("wet gain is NaN")),
            _ => Ok(()),
        }
    }
}

/// Checks that `frequency` is a usable sample rate.
pub fn validate_frequency(frequency : f32) -> EngineResult<()>
{
    if frequency.is_finite() && frequency > 0.0 && frequency <= MAX_FREQUENCY { Ok(()) }
    else { Err(EngineError::InvalidFrequency(frequency)) }
}

// ==========================================
// Effect State
// ==========================================

/// State every effect carries: enable flag, sample rate and wet/dry mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectState
{
    enabled : bool,
    frequency : f32,
    mix : f32
}
impl EffectState
{
    /// Enabled, 22050 Hz, half wet.
    pub const fn new() -> Self { return Self { enabled : true, frequency : DEFAULT_FREQUENCY, mix : DEFAULT_MIX }; }

    /// Whether the effect is processing.
    pub fn is_enabled(&self) -> bool { return self.enabled; }
    /// Enable or bypass the effect.
    pub fn set_enabled(&mut self, enabled : bool) { self.enabled = enabled; }
    /// Sample rate in Hz.
    pub fn frequency(&self) -> f32 { return self.frequency; }

    /// Stores a frequency the owning effect has already validated.
    pub(crate) fn store_frequency(&mut self, frequency : f32) { self.frequency = frequency; }

    /// Wet/dry mix (0.0 = fully dry, 1.0 = fully wet).
    pub fn mix(&self) -> f32 { return self.mix; }

    /// Set the mix, clamped to `0.0..=1.0`. NaN is ignored.
    pub fn set_mix(&mut self, mix : f32)
    {
        if mix.is_nan() { return; }
        self.mix = mix.clamp(0.0, 1.0);
    }
}
impl Default for EffectState
{
    fn default() -> Self { Self::new() }
}

// ==========================================
// Effect Trait
// ==========================================

/// Audio effect processor.
///
/// `process` and `process_in_place` run on the audio thread: implementations must not
/// allocate, lock or fail there. Everything else is configuration.
pub trait Effect : Send
{
    /// Returns name.
    fn name(&self) -> &str;

    /// Shared enable/frequency/mix state.
    fn state(&self) -> &EffectState;
    /// Mutable shared state.
    fn state_mut(&mut self) -> &mut EffectState;

    /// Process `min(input.len(), output.len())` samples from `input` into `output`.
    fn process(&mut self, input : &[f32], output : &mut [f32]);

    /// Process a buffer in place.
    fn process_in_place(&mut self, buffer : &mut [f32]);

    /// Change the sample rate and recompute anything derived from it.
    ///
    /// Buffered history stays valid. On error nothing changes.
    fn set_frequency(&mut self, frequency : f32) -> EngineResult<()>;

    /// Apply one parameter update. On error nothing changes.
    fn set_parameter(&mut self, parameter : Parameter) -> EngineResult<()>;

    /// Check a parameter update against the current effect state without applying it.
    fn check_parameter(&self, parameter : &Parameter) -> EngineResult<()> { parameter.validate() }

    /// Apply a batch of updates; all are checked before any is applied.
    fn set_parameters(&mut self, parameters : &[Parameter]) -> EngineResult<()>
    {
        if parameters.is_empty() { return Err(EngineError::EmptyParameters); }
        for parameter in parameters { self.check_parameter(parameter)?; }
        for parameter in parameters { self.set_parameter(*parameter)?; }
        Ok(())
    }

    /// Forget stream-local history so the next block starts fresh.
    fn reset(&mut self);

    fn frequency(&self) -> f32 { self.state().frequency() }
    fn mix(&self) -> f32 { self.state().mix() }
    fn set_mix(&mut self, mix : f32) { self.state_mut().set_mix(mix); }
    fn is_enabled(&self) -> bool { self.state().is_enabled() }
    fn set_enabled(&mut self, enabled : bool) { self.state_mut().set_enabled(enabled); }
}
