//! Multi-tap delay.
//!
//! A multi-tap delay sums several delayed copies of the input:
//!
//! ```text
//! wet[n] = x[n - t0] + a * x[n - t1] + a^2 * x[n - t2] + ...
//! ```
//!
//! The first tap is the direct reflection and is never attenuated. Taps that reach further
//! back than the history currently held contribute silence, so a fresh stream fades in
//! tap by tap instead of reading whatever the buffer held before.

use no_denormals::*;

use crate::buffer::CircularBuffer;
use crate::config::DelayConfig;
use crate::effect::*;
use crate::error::{EngineError, EngineResult};

// ==========================================
// Constants
// ==========================================

/// Samples held by a default delay: the longest tap at the highest sample rate.
pub const DELAY_BUFFER_CAPACITY : usize = MAX_TAP_DELAY_SECONDS * MAX_FREQUENCY as usize;
/// Lower bound of the per-tap attenuation.
pub const MIN_ATTENUATION : f32 = 0.25;
/// Upper bound of the per-tap attenuation.
pub const MAX_ATTENUATION : f32 = 1.0;
/// Attenuation of a new delay.
pub const DEFAULT_ATTENUATION : f32 = 0.5;
/// Wet path headroom of a new delay.
pub const DEFAULT_WET_GAIN : f32 = 0.5;
/// Tap used by [`MultiTapDelay::new`].
pub const DEFAULT_TAP_MS : f32 = 200.0;

/// Converts tap delays to sample offsets, `round(ms * frequency / 1000)` each.
///
/// Fails on the first offset that does not fit `capacity` samples of history.
pub(crate) fn tap_offsets(taps : &TapList, frequency : f32, capacity : usize) -> EngineResult<[usize; MAX_TAPS]>
{
    let mut offsets = [0usize; MAX_TAPS];
    for (index, &delay_ms) in taps.as_slice().iter().enumerate()
    {
        let offset = (delay_ms as f64 * frequency as f64 / 1000.0).round() as usize;
        if offset > capacity { return Err(EngineError::TapOutOfRange { index, offset, capacity }); }
        offsets[index] = offset;
    }
    Ok(offsets)
}

// ==========================================
// Multi-Tap Delay
// ==========================================

/// Multi-tap delay with geometric tap attenuation and optional level compensation.
///
/// # Parameters
/// - `taps` - Tap delays in milliseconds, order-significant. Cached as sample offsets
///   `round(ms * frequency / 1000)`, recomputed on every tap or frequency change.
/// - `attenuation` - Decay per tap after the first (`0.25..=1.0`)
/// - `compressor` - Scales the attenuated taps by `1 / (taps - 1)` when more than two taps are set
/// - `wet_gain` - Headroom applied to the wet path on top of the mix (default 0.5)
///
/// # Output
/// `out = wet * mix * wet_gain + in * (1 - mix * wet_gain)`.
/// When disabled the input is copied unchanged, but history keeps accumulating so the
/// effect can be enabled mid-stream without a cold start.
///
/// # Real-time
/// The history buffer is allocated once in the constructor and sized for the longest tap
/// at the highest sample rate. `process` never allocates, locks or fails.
pub struct MultiTapDelay
{
    state : EffectState,
    taps : TapList,
    tap_samples : [usize; MAX_TAPS],
    attenuation : f32,
    compressor : bool,
    compensation : f32,
    wet_gain : f32,
    history : CircularBuffer<f32>
}
impl MultiTapDelay
{
    /// Create a delay with a single 200 ms tap.
    pub fn new() -> Self
    {
        let mut delay = Self::with_capacity(DELAY_BUFFER_CAPACITY);
        let taps = TapList::from_derived(&[DEFAULT_TAP_MS]);
        delay.tap_samples = tap_offsets(&taps, DEFAULT_FREQUENCY, usize::MAX).unwrap_or([0; MAX_TAPS]);
        delay.taps = taps;
        delay
    }

    /// Create a delay without taps holding `capacity` samples of history.
    pub fn with_capacity(capacity : usize) -> Self
    {
        Self
        {
            state : EffectState::new(),
            taps : TapList::new(),
            tap_samples : [0; MAX_TAPS],
            attenuation : DEFAULT_ATTENUATION,
            compressor : false,
            compensation : 1.0,
            wet_gain : DEFAULT_WET_GAIN,
            history : CircularBuffer::new(capacity)
        }
    }

    /// Create a delay from tap delays in milliseconds.
    pub fn from_millis(delays_ms : &[f32]) -> EngineResult<Self>
    {
        let mut delay = Self::with_capacity(DELAY_BUFFER_CAPACITY);
        delay.set_tap_delays_ms(delays_ms)?;
        Ok(delay)
    }

    /// Create a delay from tap offsets in samples at the default frequency.
    ///
    /// The millisecond delays are derived from the offsets so a later frequency change
    /// rescales the taps. An offset longer than `MAX_TAP_DELAY_MS` at that frequency is
    /// rejected the same way a millisecond delay would be.
    pub fn from_samples(offsets : &[usize]) -> EngineResult<Self>
    {
        if offsets.len() > MAX_TAPS { return Err(EngineError::TooManyTaps { count : offsets.len(), max : MAX_TAPS }); }
        let mut delay = Self::with_capacity(DELAY_BUFFER_CAPACITY);
        let capacity = delay.capacity();
        let frequency = delay.frequency();
        let mut delays_ms = [0.0f32; MAX_TAPS];
        for (index, &offset) in offsets.iter().enumerate()
        {
            if offset > capacity { return Err(EngineError::TapOutOfRange { index, offset, capacity }); }
            delays_ms[index] = (offset as f64 * 1000.0 / frequency as f64) as f32;
        }
        // Derived delays obey the same millisecond limit as delays given directly.
        delay.taps = TapList::from_millis(&delays_ms[..offsets.len()])?;
        delay.tap_samples[..offsets.len()].copy_from_slice(offsets);
        delay.update_compensation();
        return Ok(delay);
    }

    /// Build a delay from a preset. Sample rate, mix, enable state and every delay parameter are applied.
    pub fn from_config(config : &DelayConfig) -> EngineResult<Self>
    {
        config.validate()?;
        let mut delay = Self::with_capacity(DELAY_BUFFER_CAPACITY);
        delay.set_frequency(config.frequency)?;
        delay.set_tap_delays_ms(&config.tap_delays_ms)?;
        delay.set_mix(config.mix);
        delay.set_enabled(config.enabled);
        delay.set_attenuation(config.attenuation);
        delay.set_compressor_enabled(config.compressor);
        delay.set_wet_gain(config.wet_gain);
        Ok(delay)
    }

    /// Snapshot of the current settings as a preset.
    pub fn config(&self) -> DelayConfig
    {
        DelayConfig
        {
            enabled : self.is_enabled(),
            frequency : self.frequency(),
            mix : self.mix(),
            tap_delays_ms : self.taps.as_slice().to_vec(),
            attenuation : self.attenuation,
            compressor : self.compressor,
            wet_gain : self.wet_gain
        }
    }

    /// Replace the taps with delays in milliseconds.
    pub fn set_tap_delays_ms(&mut self, delays_ms : &[f32]) -> EngineResult<()>
    {
        self.set_parameter(Parameter::TapDelaysMs(TapList::from_millis(delays_ms)?))
    }

    /// Tap delays in milliseconds, in declaration order.
    pub fn tap_delays_ms(&self) -> &[f32] { return self.taps.as_slice(); }

    /// Cached tap offsets in samples, one per tap delay.
    pub fn tap_samples(&self) -> &[usize] { return &self.tap_samples[..self.taps.len()]; }

    /// Number of configured taps.
    pub fn tap_count(&self) -> usize { return self.taps.len(); }

    /// Longest tap delay accepted, in milliseconds.
    pub fn max_tap_delay_ms(&self) -> f32 { return MAX_TAP_DELAY_MS; }

    /// Per-tap attenuation. Tap `i` is weighted by `attenuation^i`.
    pub fn attenuation(&self) -> f32 { return self.attenuation; }

    /// Set the per-tap attenuation, clamped to `0.25..=1.0`. NaN is ignored.
    pub fn set_attenuation(&mut self, attenuation : f32)
    {
        if attenuation.is_nan() { return; }
        self.attenuation = attenuation.clamp(MIN_ATTENUATION, MAX_ATTENUATION);
    }

    /// Whether tap-count compensation is on.
    pub fn is_compressor_enabled(&self) -> bool { return self.compressor; }

    /// Turn tap-count compensation on or off. With more than two taps the wet sum is scaled by `1/(taps-1)`.
    pub fn set_compressor_enabled(&mut self, enabled : bool)
    {
        self.compressor = enabled;
        self.update_compensation();
    }

    /// Headroom applied to the wet path before the mix.
    pub fn wet_gain(&self) -> f32 { return self.wet_gain; }

    /// Set the wet path headroom, clamped to `0.0..=1.0`. NaN is ignored.
    pub fn set_wet_gain(&mut self, wet_gain : f32)
    {
        if wet_gain.is_nan() { return; }
        self.wet_gain = wet_gain.clamp(0.0, 1.0);
    }

    /// History capacity in samples.
    pub fn capacity(&self) -> usize { return self.history.capacity(); }

    /// Samples of history currently held.
    pub fn filled(&self) -> usize { return self.history.filled(); }

    fn update_compensation(&mut self)
    {
        let count = self.taps.len();
        self.compensation = if self.compressor && count > 2 { 1.0 / (count - 1) as f32 } else { 1.0 };
    }

    /// Sum the taps that have enough history behind them.
    #[inline]
    fn render_taps(&self, current : f32) -> f32
    {
        let mut first = None;
        let mut attenuated = 0.0;
        let mut weight = 1.0;
        for &offset in self.tap_samples()
        {
            let sample = if offset == 0 { current }
            else
            {
                match self.history.delayed(offset)
                {
                    Some(sample) => sample,
                    None => continue
                }
            };
            if first.is_none() { first = Some(sample); }
            else
            {
                weight *= self.attenuation;
                attenuated += sample * weight;
            }
        }
        match first
        {
            None => 0.0,
            Some(first) => first + attenuated * self.compensation
        }
    }

    #[inline]
    fn tick(&mut self, input : f32) -> f32
    {
        let dry = if input.is_finite() { input } else { 0.0 };
        let output = if self.state.is_enabled()
        {
            let wet = self.state.mix() * self.wet_gain;
            self.render_taps(dry) * wet + dry * (1.0 - wet)
        }
        else { input };
        self.history.push(dry);
        output
    }
}
impl Default for MultiTapDelay
{
    fn default() -> Self { Self::new() }
}
impl Effect for MultiTapDelay
{
    fn name(&self) -> &str { "Multi-Tap Delay" }
    fn state(&self) -> &EffectState { &self.state }
    fn state_mut(&mut self) -> &mut EffectState { &mut self.state }

    fn process(&mut self, input : &[f32], output : &mut [f32])
    {
        let frames = input.len().min(output.len());
        no_denormals(||
        {
            for index in 0..frames
            {
                output[index] = self.tick(input[index]);
            }
        });
    }

    fn process_in_place(&mut self, buffer : &mut [f32])
    {
        no_denormals(||
        {
            for sample in buffer.iter_mut()
            {
                *sample = self.tick(*sample);
            }
        });
    }

    fn set_frequency(&mut self, frequency : f32) -> EngineResult<()>
    {
        validate_frequency(frequency)?;
        self.tap_samples = tap_offsets(&self.taps, frequency, self.capacity())?;
        self.state.store_frequency(frequency);
        Ok(())
    }

    fn check_parameter(&self, parameter : &Parameter) -> EngineResult<()>
    {
        parameter.validate()?;
        if let Parameter::TapDelaysMs(taps) = parameter
        {
            tap_offsets(taps, self.frequency(), self.capacity())?;
        }
        Ok(())
    }

    fn set_parameter(&mut self, parameter : Parameter) -> EngineResult<()>
    {
        parameter.validate()?;
        match parameter
        {
            Parameter::TapDelaysMs(taps) =>
            {
                self.tap_samples = tap_offsets(&taps, self.frequency(), self.capacity())?;
                self.taps = taps;
                self.update_compensation();
            }
            Parameter::Attenuation(attenuation) => self.set_attenuation(attenuation),
            Parameter::Compressor(enabled) => self.set_compressor_enabled(enabled),
            Parameter::WetGain(wet_gain) => self.set_wet_gain(wet_gain),
        }
        Ok(())
    }

    fn reset(&mut self) { self.history.reset(); }
}
