//! Pull-based playback of a sample source through an optional filter.
//!
//! The [`Player`] is owned by whatever drives audio: a driver callback, a test, an offline
//! render loop. It is controlled from elsewhere through a [`Transport`], which only flips an
//! atomic state, so transport calls never block the audio side.
//!
//! ```
//! use multitap::delay::MultiTapDelay;
//! use multitap::player::{MemorySource, PlaybackStatus, Player, PlayerState};
//!
//! let mut player = Player::new(Box::new(MemorySource::new(vec![0.5; 1000], 44100.0)));
//! player.register_filter(Box::new(MultiTapDelay::new())).unwrap();
//!
//! let transport = player.transport();
//! transport.start().unwrap();
//!
//! let mut block = [0.0f32; 256];
//! while player.render(&mut block) != PlaybackStatus::Finished {}
//! assert_eq!(transport.state(), PlayerState::Stopped);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::effect::Effect;
use crate::error::{EngineError, EngineResult};

// ==========================================
// Sources
// ==========================================

/// Mono sample stream feeding a [`Player`].
pub trait SampleSource : Send
{
    /// Native sample rate in Hz.
    fn sample_rate(&self) -> f32;
    /// Fill `output` from the current position. Returns how many samples were written;
    /// fewer than `output.len()` means the source is exhausted.
    fn read(&mut self, output : &mut [f32]) -> usize;
    /// Seek back to the first sample.
    fn rewind(&mut self);
}

/// Source playing a buffer held in memory.
pub struct MemorySource
{
    samples : Vec<f32>,
    sample_rate : f32,
    position : usize
}
impl MemorySource
{
    /// Source over `samples`, played at `sample_rate`.
    pub fn new(samples : Vec<f32>, sample_rate : f32) -> Self { return Self { samples, sample_rate, position : 0 }; }
    /// Samples read since the last rewind.
    pub fn position(&self) -> usize { return self.position; }
    /// Total samples held.
    pub fn len(&self) -> usize { return self.samples.len(); }
    pub fn is_empty(&self) -> bool { return self.samples.is_empty(); }
}
impl SampleSource for MemorySource
{
    fn sample_rate(&self) -> f32 { self.sample_rate }

    fn read(&mut self, output : &mut [f32]) -> usize
    {
        let count = output.len().min(self.samples.len() - self.position);
        output[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }

    fn rewind(&mut self) { self.position = 0; }
}

// ==========================================
// Transport
// ==========================================

/// Playback state as seen by a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState
{
    Stopped,
    Playing,
    Paused,
}

const STOPPED : u8 = 0;
const PLAYING : u8 = 1;
const PAUSED : u8 = 2;

/// Outcome of one [`Player::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus
{
    /// Source samples were rendered.
    Playing,
    /// Stopped or paused; the block is silent.
    Idle,
    /// The source ran out during this block. The player is now stopped.
    Finished,
}

/// Cloneable control handle of a [`Player`].
#[derive(Clone)]
pub struct Transport
{
    state : Arc<AtomicU8>,
    // Set by every stop; the player rewinds before its next playing block.
    rewind : Arc<AtomicBool>,
    played : Arc<AtomicU64>
}
impl Transport
{
    fn transition(&self, from : u8, to : u8) -> bool
    {
        self.state.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Play from the beginning when stopped, or continue when paused.
    pub fn start(&self) -> EngineResult<()>
    {
        if self.transition(STOPPED, PLAYING) || self.transition(PAUSED, PLAYING)
        {
            log::debug!("Playback started");
            return Ok(());
        }
        Err(EngineError::InvalidUse("player is already playing"))
    }

    /// Stop playback. The next start plays from the beginning.
    pub fn stop(&self) -> EngineResult<()>
    {
        self.rewind.store(true, Ordering::Release);
        match self.state.swap(STOPPED, Ordering::AcqRel)
        {
            STOPPED => Err(EngineError::InvalidUse("player is not playing")),
            _ => { log::debug!("Playback stopped"); Ok(()) }
        }
    }

    /// Hold the current position.
    pub fn pause(&self) -> EngineResult<()>
    {
        if self.transition(PLAYING, PAUSED) { return Ok(()); }
        Err(EngineError::InvalidUse("player is not playing"))
    }

    /// Continue after [`pause`](Self::pause).
    pub fn resume(&self) -> EngineResult<()>
    {
        if self.transition(PAUSED, PLAYING) { return Ok(()); }
        Err(EngineError::InvalidUse("player is not paused"))
    }

    /// Current transport state.
    pub fn state(&self) -> PlayerState
    {
        match self.state.load(Ordering::Acquire)
        {
            PLAYING => PlayerState::Playing,
            PAUSED => PlayerState::Paused,
            _ => PlayerState::Stopped,
        }
    }

    /// Whether the player is rendering the source.
    pub fn is_playing(&self) -> bool { return self.state() == PlayerState::Playing; }

    /// Source samples rendered since the player was created.
    pub fn played_samples(&self) -> u64 { return self.played.load(Ordering::Acquire); }
}

// ==========================================
// Player
// ==========================================

/// Renders a [`SampleSource`] block by block, passing it through a registered filter.
pub struct Player
{
    source : Box<dyn SampleSource>,
    filter : Option<Box<dyn Effect>>,
    transport : Transport
}
impl Player
{
    /// Stopped player over `source`, with no filter.
    pub fn new(source : Box<dyn SampleSource>) -> Self
    {
        Self
        {
            source,
            filter : None,
            transport : Transport
            {
                state : Arc::new(AtomicU8::new(STOPPED)),
                rewind : Arc::new(AtomicBool::new(false)),
                played : Arc::new(AtomicU64::new(0))
            }
        }
    }

    /// A handle controlling this player from another thread.
    pub fn transport(&self) -> Transport { return self.transport.clone(); }

    /// Sample rate of the source.
    pub fn sample_rate(&self) -> f32 { return self.source.sample_rate(); }

    /// Install `filter`, retuned to the source sample rate. Replaces any previous filter.
    ///
    /// A filter fed through a [`DelayController`](crate::control::DelayController) should get
    /// the same rate from its controller, which only knows what it was told.
    pub fn register_filter(&mut self, mut filter : Box<dyn Effect>) -> EngineResult<()>
    {
        filter.set_frequency(self.source.sample_rate())?;
        log::info!("Registered filter \"{}\" at {} Hz", filter.name(), filter.frequency());
        self.filter = Some(filter);
        Ok(())
    }

    /// Remove and return the current filter.
    pub fn unregister_filter(&mut self) -> Option<Box<dyn Effect>> { return self.filter.take(); }

    /// The registered filter, if any.
    pub fn filter(&self) -> Option<&dyn Effect> { return self.filter.as_deref(); }

    /// Render one block into `output`.
    ///
    /// Silent while stopped or paused. A start from stopped rewinds the source and resets the
    /// filter first. When the source runs dry the rest of the block is silent and the player stops.
    pub fn render(&mut self, output : &mut [f32]) -> PlaybackStatus
    {
        if self.transport.state.load(Ordering::Acquire) != PLAYING
        {
            output.fill(0.0);
            return PlaybackStatus::Idle;
        }
        if self.transport.rewind.swap(false, Ordering::AcqRel)
        {
            self.source.rewind();
            if let Some(filter) = self.filter.as_mut() { filter.reset(); }
        }

        let read = self.source.read(output);
        output[read..].fill(0.0);
        if let Some(filter) = self.filter.as_mut() { filter.process_in_place(&mut output[..read]); }
        self.transport.played.fetch_add(read as u64, Ordering::AcqRel);

        if read < output.len()
        {
            self.transport.rewind.store(true, Ordering::Release);
            self.transport.transition(PLAYING, STOPPED);
            return PlaybackStatus::Finished;
        }
        PlaybackStatus::Playing
    }

    /// Wrap the player as a driver callback that stops the stream at the end of the source.
    #[cfg(feature = "realtime")]
    pub fn into_callback(mut self) -> crate::realtime::AudioCallback
    {
        Box::new(move |buffer, _time| match self.render(buffer)
        {
            PlaybackStatus::Finished => crate::realtime::CallbackResult::Stop,
            _ => crate::realtime::CallbackResult::Continue,
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::delay::MultiTapDelay;

    fn ramp(len : usize) -> Vec<f32> { (0..len).map(|i| i as f32).collect() }

    #[test]
    fn transport_transitions()
    {
        let player = Player::new(Box::new(MemorySource::new(ramp(8), 1000.0)));
        let transport = player.transport();

        assert_eq!(transport.state(), PlayerState::Stopped);
        assert!(transport.stop().is_err());
        assert!(transport.pause().is_err());
        assert!(transport.resume().is_err());

        transport.start().unwrap();
        assert!(transport.start().is_err());
        transport.pause().unwrap();
        assert_eq!(transport.state(), PlayerState::Paused);
        transport.resume().unwrap();
        assert!(transport.is_playing());
        transport.stop().unwrap();
        assert_eq!(transport.state(), PlayerState::Stopped);
    }

    #[test]
    fn silent_until_started()
    {
        let mut player = Player::new(Box::new(MemorySource::new(ramp(8), 1000.0)));
        let mut block = [9.0; 4];
        assert_eq!(player.render(&mut block), PlaybackStatus::Idle);
        assert_eq!(block, [0.0; 4]);
    }

    #[test]
    fn pause_holds_position()
    {
        let mut player = Player::new(Box::new(MemorySource::new(ramp(8), 1000.0)));
        let transport = player.transport();
        let mut block = [0.0; 3];

        transport.start().unwrap();
        player.render(&mut block);
        assert_eq!(block, [0.0, 1.0, 2.0]);

        transport.pause().unwrap();
        assert_eq!(player.render(&mut block), PlaybackStatus::Idle);
        transport.resume().unwrap();
        player.render(&mut block);
        assert_eq!(block, [3.0, 4.0, 5.0]);
        assert_eq!(transport.played_samples(), 6);
    }

    #[test]
    fn end_of_source_stops()
    {
        let mut player = Player::new(Box::new(MemorySource::new(ramp(5), 1000.0)));
        let transport = player.transport();
        let mut block = [7.0; 4];

        transport.start().unwrap();
        assert_eq!(player.render(&mut block), PlaybackStatus::Playing);
        assert_eq!(player.render(&mut block), PlaybackStatus::Finished);
        assert_eq!(block, [4.0, 0.0, 0.0, 0.0]);
        assert_eq!(transport.state(), PlayerState::Stopped);
    }

    #[test]
    fn restart_rewinds_and_resets_filter()
    {
        let mut player = Player::new(Box::new(MemorySource::new(vec![1.0, 0.0, 0.0, 0.0], 1000.0)));
        let mut delay = MultiTapDelay::from_millis(&[2.0]).unwrap();
        delay.set_mix(1.0);
        delay.set_wet_gain(1.0);
        player.register_filter(Box::new(delay)).unwrap();
        assert_eq!(player.filter().map(|filter| filter.frequency()), Some(1000.0));

        let transport = player.transport();
        let mut block = [0.0; 4];
        transport.start().unwrap();
        player.render(&mut block);
        assert_eq!(block, [0.0, 0.0, 1.0, 0.0]);

        transport.stop().unwrap();
        transport.start().unwrap();
        player.render(&mut block);
        assert_eq!(block, [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejected_filter_is_not_installed()
    {
        let mut player = Player::new(Box::new(MemorySource::new(ramp(4), 200000.0)));
        assert!(player.register_filter(Box::new(MultiTapDelay::new())).is_err());
        assert!(player.filter().is_none());
    }
}
