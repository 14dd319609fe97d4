//! Callback-driven stream driver.
//!
//! [`Realtime`] runs a mono output callback on its own thread, one fixed-size block at a time,
//! paced to the stream's sample rate. The rendered audio is discarded: the driver stands in
//! for a device so hosts, players and filters can be exercised without audio hardware.
//!
//! # Callback Model
//!
//! The callback receives a zeroed block and the stream time in seconds, fills the block and
//! returns [`CallbackResult::Stop`] to end the stream from the audio side.
//!
//! ```
//! use multitap::realtime::{CallbackResult, Realtime};
//!
//! let mut audio = Realtime::new().with_pacing(false);
//! let mut blocks = 0;
//! audio.open_stream(48000, 256, Box::new(move |output, _time|
//! {
//!     output.fill(0.25);
//!     blocks += 1;
//!     if blocks == 4 { CallbackResult::Stop } else { CallbackResult::Continue }
//! })).unwrap();
//!
//! audio.start_stream().unwrap();
//! while audio.is_stream_running() { std::thread::yield_now(); }
//! audio.stop_stream().unwrap();
//! assert_eq!(audio.get_stream_frames(), 1024);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// What the stream does after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult
{
    Continue,
    Stop,
}

/// Audio callback: fills one block, given the stream time in seconds.
pub type AudioCallback = Box<dyn FnMut(&mut [f32], f64) -> CallbackResult + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState
{
    Closed,
    Stopped,
    Running,
}

/// Dummy audio driver.
pub struct Realtime
{
    state : StreamState,
    sample_rate : u32,
    buffer_frames : usize,
    paced : bool,
    callback : Option<AudioCallback>,
    running : Arc<AtomicBool>,
    frames : Arc<AtomicU64>,
    thread_handle : Option<JoinHandle<AudioCallback>>
}
impl Realtime
{
    /// A closed driver that sleeps one block duration between callbacks.
    pub fn new() -> Self
    {
        Self
        {
            state : StreamState::Closed,
            sample_rate : 0,
            buffer_frames : 0,
            paced : true,
            callback : None,
            running : Arc::new(AtomicBool::new(false)),
            frames : Arc::new(AtomicU64::new(0)),
            thread_handle : None
        }
    }

    /// Turn wall-clock pacing on or off. Unpaced streams call back as fast as they can.
    pub fn with_pacing(mut self, paced : bool) -> Self
    {
        self.paced = paced;
        self
    }

    /// Open a stream.
    ///
    /// # Arguments
    /// * `sample_rate` - Stream rate in Hz
    /// * `buffer_frames` - Samples per callback
    /// * `callback` - Block renderer
    ///
    /// # Returns
    /// The block size used.
    pub fn open_stream(&mut self, sample_rate : u32, buffer_frames : usize, callback : AudioCallback) -> EngineResult<usize>
    {
        if self.state != StreamState::Closed { return Err(EngineError::InvalidUse("Stream is already open")); }
        if sample_rate == 0 { return Err(EngineError::InvalidParameter("sample rate must be positive")); }
        if buffer_frames == 0 { return Err(EngineError::InvalidParameter("buffer size must be positive")); }

        self.sample_rate = sample_rate;
        self.buffer_frames = buffer_frames;
        self.callback = Some(callback);
        self.frames.store(0, Ordering::Release);
        self.state = StreamState::Stopped;
        log::info!("Opened stream: {} Hz, {} frames per buffer", sample_rate, buffer_frames);
        Ok(buffer_frames)
    }

    /// Close the stream, stopping it first if needed.
    pub fn close_stream(&mut self)
    {
        if self.state == StreamState::Running { let _ = self.stop_stream(); }
        self.callback = None;
        self.state = StreamState::Closed;
    }

    /// Start calling back on the audio thread.
    pub fn start_stream(&mut self) -> EngineResult<()>
    {
        match self.state
        {
            StreamState::Closed => return Err(EngineError::InvalidUse("Stream is not open")),
            StreamState::Running => return Err(EngineError::InvalidUse("Stream is already running")),
            StreamState::Stopped => {}
        }
        let Some(callback) = self.callback.take() else { return Err(EngineError::InvalidUse("Stream has no callback")); };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let frames = Arc::clone(&self.frames);
        let (sample_rate, buffer_frames, paced) = (self.sample_rate, self.buffer_frames, self.paced);
        self.thread_handle = Some(std::thread::spawn(move ||
        {
            Self::audio_thread(callback, sample_rate, buffer_frames, paced, running, frames)
        }));
        self.state = StreamState::Running;
        log::info!("Stream started");
        Ok(())
    }

    /// Stop the stream and take the callback back from the audio thread.
    ///
    /// Also needed after the callback stopped the stream itself.
    pub fn stop_stream(&mut self) -> EngineResult<()>
    {
        if self.state != StreamState::Running { return Err(EngineError::InvalidUse("Stream is not running")); }

        self.running.store(false, Ordering::Release);
        let joined = self.thread_handle.take().map(|handle| handle.join());
        self.state = StreamState::Stopped;
        match joined
        {
            Some(Ok(callback)) => self.callback = Some(callback),
            _ =>
            {
                log::error!("Audio thread panicked, closing stream");
                self.state = StreamState::Closed;
                return Err(EngineError::InvalidUse("audio thread panicked"));
            }
        }
        log::info!("Stream stopped after {} frames", self.get_stream_frames());
        Ok(())
    }

    /// Whether a stream is open, running or not.
    pub fn is_stream_open(&self) -> bool { return self.state != StreamState::Closed; }

    /// Whether the audio thread is still calling back.
    pub fn is_stream_running(&self) -> bool
    {
        self.state == StreamState::Running && self.running.load(Ordering::Acquire)
    }

    /// Frames rendered since the stream was opened.
    pub fn get_stream_frames(&self) -> u64 { return self.frames.load(Ordering::Acquire); }

    /// Stream time in seconds.
    pub fn get_stream_time(&self) -> f64
    {
        if self.sample_rate == 0 { return 0.0; }
        self.get_stream_frames() as f64 / self.sample_rate as f64
    }

    /// Sample rate the stream was opened with.
    pub fn get_stream_sample_rate(&self) -> u32 { return self.sample_rate; }

    /// Latency of one buffer in samples.
    pub fn get_stream_latency(&self) -> usize { return self.buffer_frames; }

    fn audio_thread(mut callback : AudioCallback, sample_rate : u32, buffer_frames : usize, paced : bool,
                    running : Arc<AtomicBool>, frames : Arc<AtomicU64>) -> AudioCallback
    {
        let period = Duration::from_secs_f64(buffer_frames as f64 / sample_rate as f64);
        let mut buffer = vec![0.0f32; buffer_frames];

        while running.load(Ordering::Acquire)
        {
            buffer.fill(0.0);
            let time = frames.load(Ordering::Acquire) as f64 / sample_rate as f64;
            let result = callback(&mut buffer, time);
            frames.fetch_add(buffer_frames as u64, Ordering::AcqRel);

            if result == CallbackResult::Stop
            {
                log::debug!("Callback stopped the stream");
                running.store(false, Ordering::Release);
                break;
            }
            if paced { std::thread::sleep(period); }
        }
        callback
    }
}
impl Default for Realtime
{
    fn default() -> Self { Self::new() }
}
impl Drop for Realtime
{
    fn drop(&mut self)
    {
        if self.is_stream_open() { self.close_stream(); }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn wait(audio : &Realtime)
    {
        while audio.is_stream_running() { std::thread::yield_now(); }
    }

    #[test]
    fn lifecycle_errors()
    {
        let mut audio = Realtime::new();
        assert!(audio.start_stream().is_err());
        assert!(audio.stop_stream().is_err());
        assert!(audio.open_stream(0, 64, Box::new(|_, _| CallbackResult::Stop)).is_err());
        assert!(!audio.is_stream_open());

        audio.open_stream(1000, 64, Box::new(|_, _| CallbackResult::Continue)).unwrap();
        assert!(audio.open_stream(1000, 64, Box::new(|_, _| CallbackResult::Continue)).is_err());
        audio.close_stream();
        assert!(!audio.is_stream_open());
    }

    #[test]
    fn callback_can_stop_and_restart()
    {
        let mut audio = Realtime::new().with_pacing(false);
        let mut calls = 0u32;
        audio.open_stream(8000, 100, Box::new(move |_, _|
        {
            calls += 1;
            if calls % 3 == 0 { CallbackResult::Stop } else { CallbackResult::Continue }
        })).unwrap();

        audio.start_stream().unwrap();
        wait(&audio);
        audio.stop_stream().unwrap();
        assert_eq!(audio.get_stream_frames(), 300);
        assert!((audio.get_stream_time() - 0.0375).abs() < 1e-9);

        audio.start_stream().unwrap();
        wait(&audio);
        audio.stop_stream().unwrap();
        assert_eq!(audio.get_stream_frames(), 600);
    }

    #[test]
    fn stop_from_control_side()
    {
        let mut audio = Realtime::new();
        audio.open_stream(48000, 48, Box::new(|output, _| { output.fill(1.0); CallbackResult::Continue })).unwrap();
        audio.start_stream().unwrap();
        assert!(audio.start_stream().is_err());
        while audio.get_stream_frames() < 96 { std::thread::yield_now(); }
        audio.stop_stream().unwrap();
        assert!(!audio.is_stream_running());
        assert!(audio.is_stream_open());
    }
}
