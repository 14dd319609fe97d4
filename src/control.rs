//! Lock-free configuration hand-off between a control thread and the audio thread.
//!
//! [`split`] turns a [`MultiTapDelay`] into two halves:
//!
//! - [`EffectProcessor`] lives on the audio thread. At the start of every block it drains the
//!   command queue and applies each command before processing the block.
//! - [`DelayController`] lives on the control thread. It validates every change before
//!   queueing it, so a rejected configuration is reported to the caller right away and never
//!   reaches the audio thread. It keeps a mirror of the last accepted settings for getters.
//!
//! The queue is a single-producer single-consumer `rtrb` ring buffer: pushing and popping
//! never lock or allocate.
//!
//! ```
//! use multitap::control::split;
//! use multitap::delay::MultiTapDelay;
//! use multitap::effect::Effect;
//!
//! let (mut processor, mut controller) = split(MultiTapDelay::new(), 64);
//! controller.set_frequency(48000.0).unwrap();
//! controller.set_mix(0.8).unwrap();
//!
//! // Audio thread: the changes land before the first sample of this block.
//! let mut block = [0.0f32; 128];
//! processor.process_in_place(&mut block);
//! assert_eq!(processor.frequency(), 48000.0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DelayConfig;
use crate::delay::{tap_offsets, MultiTapDelay, MAX_ATTENUATION, MIN_ATTENUATION};
use crate::effect::*;
use crate::error::{EngineError, EngineResult};

/// Default number of pending commands a controller can queue.
pub const DEFAULT_QUEUE_CAPACITY : usize = 256;

/// Commands sent from the control thread to the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command
{
    /// Enable or bypass the effect.
    SetEnabled(bool),
    /// Set the wet/dry mix.
    SetMix(f32),
    /// Change the sample rate.
    SetFrequency(f32),
    /// Apply an effect parameter.
    SetParameter(Parameter),
    /// Forget stream history.
    Reset,
}

/// Counters published by the audio thread.
#[derive(Debug, Default)]
pub struct ProcessorStats
{
    applied : AtomicU64,
    rejected : AtomicU64
}
impl ProcessorStats
{
    /// Commands applied so far.
    pub fn applied(&self) -> u64 { return self.applied.load(Ordering::Acquire); }
    /// Commands the effect refused when they were applied.
    pub fn rejected(&self) -> u64 { return self.rejected.load(Ordering::Acquire); }
}

// ==========================================
// Audio Side
// ==========================================

/// Audio-thread half: an effect plus the consumer end of its command queue.
pub struct EffectProcessor<E : Effect>
{
    effect : E,
    command_rx : rtrb::Consumer<Command>,
    stats : Arc<ProcessorStats>
}
impl<E : Effect> EffectProcessor<E>
{
    /// Wrap `effect`, reading commands from `command_rx`.
    pub fn new(effect : E, command_rx : rtrb::Consumer<Command>) -> Self
    {
        Self { effect, command_rx, stats : Arc::new(ProcessorStats::default()) }
    }

    /// Apply every pending command.
    pub fn drain_commands(&mut self)
    {
        while let Ok(command) = self.command_rx.pop()
        {
            self.apply(command);
        }
    }

    fn apply(&mut self, command : Command)
    {
        let result = match command
        {
            Command::SetEnabled(enabled) => { self.effect.set_enabled(enabled); Ok(()) }
            Command::SetMix(mix) => { self.effect.set_mix(mix); Ok(()) }
            Command::SetFrequency(frequency) => self.effect.set_frequency(frequency),
            Command::SetParameter(parameter) => self.effect.set_parameter(parameter),
            Command::Reset => { self.effect.reset(); Ok(()) }
        };
        let counter = if result.is_ok() { &self.stats.applied } else { &self.stats.rejected };
        counter.fetch_add(1, Ordering::Release);
    }

    /// Shared counters, readable from any thread.
    pub fn stats(&self) -> Arc<ProcessorStats> { return Arc::clone(&self.stats); }

    /// The wrapped effect.
    pub fn effect(&self) -> &E { return &self.effect; }
    /// The wrapped effect, mutably. Changes made here bypass the controller mirror.
    pub fn effect_mut(&mut self) -> &mut E { return &mut self.effect; }

    /// Unwrap the effect, dropping the queue.
    pub fn into_inner(self) -> E { return self.effect; }
}
impl<E : Effect> Effect for EffectProcessor<E>
{
    fn name(&self) -> &str { self.effect.name() }
    fn state(&self) -> &EffectState { self.effect.state() }
    fn state_mut(&mut self) -> &mut EffectState { self.effect.state_mut() }

    fn process(&mut self, input : &[f32], output : &mut [f32])
    {
        self.drain_commands();
        self.effect.process(input, output);
    }

    fn process_in_place(&mut self, buffer : &mut [f32])
    {
        self.drain_commands();
        self.effect.process_in_place(buffer);
    }

    fn set_frequency(&mut self, frequency : f32) -> EngineResult<()> { self.effect.set_frequency(frequency) }
    fn set_parameter(&mut self, parameter : Parameter) -> EngineResult<()> { self.effect.set_parameter(parameter) }
    fn check_parameter(&self, parameter : &Parameter) -> EngineResult<()> { self.effect.check_parameter(parameter) }
    fn reset(&mut self) { self.effect.reset(); }
}

// ==========================================
// Control Side
// ==========================================

/// Control-thread half of a split [`MultiTapDelay`].
pub struct DelayController
{
    command_tx : rtrb::Producer<Command>,
    settings : DelayConfig,
    capacity : usize,
    stats : Arc<ProcessorStats>
}
impl DelayController
{
    fn send(&mut self, command : Command) -> EngineResult<()>
    {
        self.command_tx.push(command).map_err(|_|
        {
            log::warn!("Command queue full, dropping {:?}", command);
            EngineError::QueueFull
        })
    }

    fn reject<T>(&self, error : EngineError) -> EngineResult<T>
    {
        log::warn!("Rejected delay configuration: {}", error);
        Err(error)
    }

    /// Enable or bypass the delay.
    pub fn set_enabled(&mut self, enabled : bool) -> EngineResult<()>
    {
        self.send(Command::SetEnabled(enabled))?;
        self.settings.enabled = enabled;
        Ok(())
    }

    /// Set the wet/dry mix, clamped to `0.0..=1.0`.
    pub fn set_mix(&mut self, mix : f32) -> EngineResult<()>
    {
        if mix.is_nan() { return self.reject(EngineError::InvalidParameter("mix is NaN")); }
        let mix = mix.clamp(0.0, 1.0);
        self.send(Command::SetMix(mix))?;
        self.settings.mix = mix;
        Ok(())
    }

    /// Change the sample rate. Rejected when any current tap would not fit the delay buffer.
    pub fn set_frequency(&mut self, frequency : f32) -> EngineResult<()>
    {
        if let Err(error) = validate_frequency(frequency).and_then(|_|
        {
            let taps = TapList::from_millis(&self.settings.tap_delays_ms)?;
            tap_offsets(&taps, frequency, self.capacity).map(|_| ())
        })
        {
            return self.reject(error);
        }
        self.send(Command::SetFrequency(frequency))?;
        self.settings.frequency = frequency;
        Ok(())
    }

    /// Validate and queue a parameter update.
    pub fn set_parameter(&mut self, parameter : Parameter) -> EngineResult<()>
    {
        if let Err(error) = parameter.validate() { return self.reject(error); }
        if let Parameter::TapDelaysMs(taps) = &parameter
        {
            if let Err(error) = tap_offsets(taps, self.settings.frequency, self.capacity) { return self.reject(error); }
        }
        self.send(Command::SetParameter(parameter))?;
        match parameter
        {
            Parameter::TapDelaysMs(taps) => self.settings.tap_delays_ms = taps.as_slice().to_vec(),
            Parameter::Attenuation(value) => self.settings.attenuation = value.clamp(MIN_ATTENUATION, MAX_ATTENUATION),
            Parameter::Compressor(enabled) => self.settings.compressor = enabled,
            Parameter::WetGain(value) => self.settings.wet_gain = value.clamp(0.0, 1.0),
        }
        Ok(())
    }

    /// Replace the taps with delays in milliseconds.
    pub fn set_tap_delays_ms(&mut self, delays_ms : &[f32]) -> EngineResult<()>
    {
        match TapList::from_millis(delays_ms)
        {
            Ok(taps) => self.set_parameter(Parameter::TapDelaysMs(taps)),
            Err(error) => self.reject(error)
        }
    }

    /// Spread `count` taps evenly over `total_ms`.
    pub fn set_taps(&mut self, count : usize, total_ms : f32) -> EngineResult<()>
    {
        match TapList::evenly_spaced(count, total_ms)
        {
            Ok(taps) => self.set_parameter(Parameter::TapDelaysMs(taps)),
            Err(error) => self.reject(error)
        }
    }

    /// Set the per-tap attenuation, clamped to `0.25..=1.0`.
    pub fn set_attenuation(&mut self, attenuation : f32) -> EngineResult<()> { return self.set_parameter(Parameter::Attenuation(attenuation)); }
    /// Turn tap-count compensation on or off.
    pub fn set_compressor_enabled(&mut self, enabled : bool) -> EngineResult<()> { return self.set_parameter(Parameter::Compressor(enabled)); }
    /// Set the wet path headroom, clamped to `0.0..=1.0`.
    pub fn set_wet_gain(&mut self, wet_gain : f32) -> EngineResult<()> { return self.set_parameter(Parameter::WetGain(wet_gain)); }

    /// Ask the audio thread to forget its history before the next block.
    pub fn reset(&mut self) -> EngineResult<()> { return self.send(Command::Reset); }

    /// Whether the delay is processing. `false` passes input through.
    pub fn is_enabled(&self) -> bool { return self.settings.enabled; }
    /// Wet/dry mix last accepted.
    pub fn mix(&self) -> f32 { return self.settings.mix; }
    /// Sample rate last accepted, in Hz.
    pub fn frequency(&self) -> f32 { return self.settings.frequency; }
    /// Per-tap attenuation last accepted.
    pub fn attenuation(&self) -> f32 { return self.settings.attenuation; }
    /// Whether tap-count compensation is on.
    pub fn is_compressor_enabled(&self) -> bool { return self.settings.compressor; }
    /// Wet path headroom last accepted.
    pub fn wet_gain(&self) -> f32 { return self.settings.wet_gain; }
    /// Tap delays in milliseconds, in declaration order.
    pub fn tap_delays_ms(&self) -> &[f32] { return &self.settings.tap_delays_ms; }
    /// Number of configured taps.
    pub fn tap_count(&self) -> usize { return self.settings.tap_delays_ms.len(); }
    /// Longest tap delay accepted, in milliseconds.
    pub fn max_tap_delay_ms(&self) -> f32 { return MAX_TAP_DELAY_MS; }

    /// Last accepted settings.
    pub fn config(&self) -> &DelayConfig { return &self.settings; }

    /// Commands queued but not yet picked up by the audio thread.
    pub fn pending(&self) -> usize { return self.command_tx.buffer().capacity() - self.command_tx.slots(); }

    /// Counters published by the audio thread.
    pub fn stats(&self) -> &ProcessorStats { return &self.stats; }
}

/// Split a delay into its audio-thread and control-thread halves.
pub fn split(delay : MultiTapDelay, queue_capacity : usize) -> (EffectProcessor<MultiTapDelay>, DelayController)
{
    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(queue_capacity.max(1));
    let settings = delay.config();
    let capacity = delay.capacity();
    let processor = EffectProcessor::new(delay, command_rx);
    let controller = DelayController { command_tx, settings, capacity, stats : processor.stats() };
    (processor, controller)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn commands_apply_before_the_block()
    {
        let delay = MultiTapDelay::from_millis(&[1.0]).unwrap();
        let (mut processor, mut controller) = split(delay, 16);
        controller.set_frequency(1000.0).unwrap();
        controller.set_mix(1.0).unwrap();
        controller.set_wet_gain(1.0).unwrap();
        assert_eq!(controller.pending(), 3);

        let mut output = [0.0; 4];
        processor.process(&[1.0, 0.0, 0.0, 0.0], &mut output);
        assert_eq!(output, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(controller.pending(), 0);
        assert_eq!(controller.stats().applied(), 3);
    }

    #[test]
    fn invalid_changes_never_reach_the_queue()
    {
        let (_processor, mut controller) = split(MultiTapDelay::new(), 16);

        assert_eq!(controller.set_frequency(-5.0), Err(EngineError::InvalidFrequency(-5.0)));
        assert!(controller.set_tap_delays_ms(&[10.0, 7000.0]).is_err());
        assert!(controller.set_taps(0, 100.0).is_err());
        assert!(controller.set_attenuation(f32::NAN).is_err());
        assert!(controller.set_mix(f32::NAN).is_err());
        assert_eq!(controller.pending(), 0);
        assert_eq!(controller.frequency(), 22050.0);
        assert_eq!(controller.tap_delays_ms(), &[200.0]);
    }

    #[test]
    fn frequency_checked_against_capacity()
    {
        let mut delay = MultiTapDelay::with_capacity(1000);
        delay.set_frequency(1000.0).unwrap();
        delay.set_tap_delays_ms(&[500.0]).unwrap();
        let (_processor, mut controller) = split(delay, 4);

        assert!(matches!(controller.set_frequency(4000.0), Err(EngineError::TapOutOfRange { .. })));
        assert!(controller.set_frequency(2000.0).is_ok());
        assert!(matches!(controller.set_tap_delays_ms(&[600.0]), Err(EngineError::TapOutOfRange { .. })));
    }

    #[test]
    fn full_queue_keeps_mirror()
    {
        let (_processor, mut controller) = split(MultiTapDelay::new(), 2);
        controller.set_mix(0.1).unwrap();
        controller.set_mix(0.2).unwrap();
        assert_eq!(controller.set_mix(0.3), Err(EngineError::QueueFull));
        assert_eq!(controller.mix(), 0.2);
    }

    #[test]
    fn mirror_tracks_accepted_settings()
    {
        let (mut processor, mut controller) = split(MultiTapDelay::new(), 16);
        controller.set_taps(3, 400.0).unwrap();
        controller.set_attenuation(0.1).unwrap();
        controller.set_compressor_enabled(true).unwrap();
        controller.set_enabled(false).unwrap();
        controller.set_mix(3.0).unwrap();

        assert_eq!(controller.tap_delays_ms(), &[100.0, 200.0, 300.0]);
        assert_eq!(controller.tap_count(), 3);
        assert_eq!(controller.attenuation(), 0.25);
        assert_eq!(controller.mix(), 1.0);
        assert!(controller.is_compressor_enabled());
        assert!(!controller.is_enabled());
        assert_eq!(controller.wet_gain(), 0.5);
        assert_eq!(controller.max_tap_delay_ms(), 5000.0);

        processor.process_in_place(&mut [0.0; 8]);
        assert_eq!(&processor.effect().config(), controller.config());
        assert_eq!(processor.effect().attenuation(), controller.attenuation());
        assert_eq!(processor.effect().is_compressor_enabled(), controller.is_compressor_enabled());
        assert_eq!(processor.effect().wet_gain(), controller.wet_gain());
    }

    #[test]
    fn reset_goes_through_the_queue()
    {
        let delay = MultiTapDelay::from_samples(&[2]).unwrap();
        let (mut processor, mut controller) = split(delay, 4);
        processor.process_in_place(&mut [1.0; 4]);
        assert_eq!(processor.effect().filled(), 4);

        controller.reset().unwrap();
        processor.process_in_place(&mut [0.0; 1]);
        assert_eq!(processor.effect().filled(), 1);
    }

    #[test]
    fn control_thread_feeds_audio_thread()
    {
        let (mut processor, mut controller) = split(MultiTapDelay::new(), 8);
        let audio = std::thread::spawn(move ||
        {
            let mut block = [0.0f32; 64];
            while processor.effect().mix() < 1.0 { processor.process_in_place(&mut block); std::thread::yield_now(); }
            processor
        });
        for step in 1..=10
        {
            while controller.set_mix(step as f32 / 10.0) == Err(EngineError::QueueFull) { std::thread::yield_now(); }
        }
        let processor = audio.join().unwrap();
        assert_eq!(processor.effect().mix(), 1.0);
        assert_eq!(controller.stats().applied(), 10);
    }
}
